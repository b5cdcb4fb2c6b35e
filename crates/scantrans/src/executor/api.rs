use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::{CredentialEntry, FailureKind};

/// Failure returned by a provider call.
///
/// The message is whatever the provider or transport said. It may contain
/// request fragments, so it is only logged at debug level and never copied
/// into a status detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::InvalidCredential(_) => FailureKind::InvalidCredential,
            ApiError::RateLimited(_) => FailureKind::RateLimited,
            ApiError::Transient(_) => FailureKind::Transient,
            ApiError::Permanent(_) => FailureKind::Permanent,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::InvalidCredential(m)
            | ApiError::RateLimited(m)
            | ApiError::Transient(m)
            | ApiError::Permanent(m) => m,
        }
    }
}

/// Opaque handle to a document image. Decoding is the provider's business.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub id: String,
    bytes: Arc<[u8]>,
}

impl ImageHandle {
    pub fn new(id: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The remote OCR / translation capability.
///
/// Implementations read the secret through [`secrecy::ExposeSecret`] on
/// `credential.secret()` and must classify every failure into an
/// [`ApiError`].
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn call_ocr(
        &self,
        image: &ImageHandle,
        credential: &CredentialEntry,
    ) -> Result<String, ApiError>;

    async fn call_translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        model_id: &str,
        credential: &CredentialEntry,
    ) -> Result<String, ApiError>;
}
