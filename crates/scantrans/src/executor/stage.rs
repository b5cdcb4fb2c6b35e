use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::api::{ApiError, ImageHandle, ProviderApi};
use crate::credentials::{CredentialEntry, CredentialPool, FailureKind, PoolError};
use crate::sanitize;
use crate::status::Stage;
use crate::store::CredentialStore;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// One external call to perform.
#[derive(Debug, Clone, Copy)]
pub enum StageCall<'a> {
    Ocr {
        image: &'a ImageHandle,
    },
    Translate {
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
        model_id: &'a str,
    },
}

impl StageCall<'_> {
    pub fn stage(&self) -> Stage {
        match self {
            StageCall::Ocr { .. } => Stage::Ocr,
            StageCall::Translate { .. } => Stage::Translation,
        }
    }
}

/// Classified result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded {
        text: String,
        credential_id: String,
    },
    Failed {
        kind: FailureKind,
        credential_id: String,
        /// Safe for status details; never the provider payload.
        reason: String,
    },
    /// No eligible credential. Nothing was called.
    Exhausted,
}

pub struct StageExecutor {
    pool: Arc<CredentialPool>,
    api: Arc<dyn ProviderApi>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    call_timeout: Duration,
}

impl StageExecutor {
    pub fn new(pool: Arc<CredentialPool>, api: Arc<dyn ProviderApi>) -> Self {
        Self {
            pool,
            api,
            credential_store: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Persist credential health after every reported outcome.
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Performs one attempt with a credential not in `tried` when possible.
    ///
    /// Only a poisoned pool lock is an `Err`; every provider failure comes
    /// back as a [`StageOutcome`].
    pub async fn execute(
        &self,
        call: StageCall<'_>,
        tried: &HashSet<String>,
    ) -> Result<StageOutcome, PoolError> {
        let credential = match self.pool.select_excluding(tried) {
            Ok(credential) => credential,
            Err(PoolError::NoCredentialsAvailable) => {
                warn!(stage = call.stage().name(), "No eligible credential for call");
                return Ok(StageOutcome::Exhausted);
            }
            Err(e) => return Err(e),
        };

        let tag = sanitize::credential_tag(&credential.id);
        debug!(
            stage = call.stage().name(),
            label = %credential.label,
            credential = %tag,
            "Calling provider"
        );

        match self.call_with_timeout(call, &credential).await {
            Ok(text) => {
                let report = self.pool.report_success(&credential.id);
                self.record(report, &tag).await?;
                debug!(
                    stage = call.stage().name(),
                    credential = %tag,
                    output = %sanitize::text_summary(&text),
                    "Provider call succeeded"
                );
                Ok(StageOutcome::Succeeded {
                    text,
                    credential_id: credential.id,
                })
            }
            Err(error) => {
                let kind = error.kind();
                debug!(
                    stage = call.stage().name(),
                    credential = %tag,
                    provider_message = %error.message(),
                    "Provider call failed"
                );
                let report = self.pool.report_failure(&credential.id, kind);
                self.record(report, &tag).await?;
                Ok(StageOutcome::Failed {
                    kind,
                    credential_id: credential.id,
                    reason: kind.describe().to_string(),
                })
            }
        }
    }

    async fn call_with_timeout(
        &self,
        call: StageCall<'_>,
        credential: &CredentialEntry,
    ) -> Result<String, ApiError> {
        let fut = async {
            match call {
                StageCall::Ocr { image } => self.api.call_ocr(image, credential).await,
                StageCall::Translate {
                    text,
                    source_lang,
                    target_lang,
                    model_id,
                } => {
                    self.api
                        .call_translate(text, source_lang, target_lang, model_id, credential)
                        .await
                }
            }
        };

        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Transient(format!(
                "call timed out after {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }

    /// Persists a health report. A credential removed from the pool while
    /// the call was in flight has nothing left to update.
    async fn record(
        &self,
        report: Result<CredentialEntry, PoolError>,
        tag: &str,
    ) -> Result<(), PoolError> {
        match report {
            Ok(updated) => {
                self.persist(&updated).await;
                Ok(())
            }
            Err(PoolError::UnknownCredential(_)) => {
                warn!(credential = %tag, "Credential removed during call, outcome not recorded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, entry: &CredentialEntry) {
        if let Some(store) = &self.credential_store {
            if let Err(e) = store.persist_credential(entry).await {
                warn!(
                    label = %entry.label,
                    credential = %sanitize::credential_tag(&entry.id),
                    error = %e,
                    "Failed to persist credential health"
                );
            }
        }
    }
}
