//! A single provider credential and its health metadata.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::pool::PoolPolicy;

/// How an external call went wrong, as far as credential health is concerned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider rejected the credential itself. Retrying with it is pointless.
    InvalidCredential,
    /// Quota or rate limit hit.
    RateLimited,
    /// Network error, 5xx, timeout.
    Transient,
    /// Malformed input, unsupported content, content policy.
    Permanent,
}

impl FailureKind {
    /// Whether a retry with another credential may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Transient)
    }

    /// Human-readable reason used in status details. Never contains provider payloads.
    pub fn describe(self) -> &'static str {
        match self {
            FailureKind::InvalidCredential => "credential rejected by provider",
            FailureKind::RateLimited => "rate limited by provider",
            FailureKind::Transient => "transient provider failure",
            FailureKind::Permanent => "request rejected by provider",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// One API credential owned by the [`CredentialPool`](super::CredentialPool).
///
/// The secret value is held in a [`SecretString`] and is never printed by
/// `Debug`. Callers that perform the actual provider call read it through
/// [`secrecy::ExposeSecret`].
#[derive(Clone)]
pub struct CredentialEntry {
    /// Stable identifier (UUID).
    pub id: String,
    /// Operator-facing name, safe to log.
    pub label: String,
    secret: SecretString,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success.
    pub error_count: u32,
    /// Inactive entries are never selected until reactivated.
    pub active: bool,
}

impl CredentialEntry {
    /// Creates a fresh, active entry with a new id.
    pub fn new(label: impl Into<String>, secret: SecretString) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), label, secret, Utc::now())
    }

    /// Rebuilds an entry with a known id, e.g. when loading from a store.
    pub fn with_id(
        id: impl Into<String>,
        label: impl Into<String>,
        secret: SecretString,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            secret,
            created_at,
            last_used_at: None,
            last_error_at: None,
            error_count: 0,
            active: true,
        }
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// True while the entry has hit the error threshold and its cooldown
    /// window since the last error has not elapsed.
    pub fn in_cooldown_at(&self, policy: &PoolPolicy, now: DateTime<Utc>) -> bool {
        if self.error_count < policy.max_errors {
            return false;
        }
        match self.last_error_at {
            Some(last_error) => now - last_error < policy.cooldown,
            None => false,
        }
    }

    /// Eligible entries may be handed out by the pool.
    pub fn is_eligible_at(&self, policy: &PoolPolicy, now: DateTime<Utc>) -> bool {
        self.active && !self.in_cooldown_at(policy, now)
    }

    pub(crate) fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
        self.error_count = 0;
        self.last_error_at = None;
    }

    pub(crate) fn record_failure(&mut self, kind: FailureKind, now: DateTime<Utc>) {
        match kind {
            FailureKind::InvalidCredential => {
                self.active = false;
            }
            FailureKind::RateLimited | FailureKind::Transient => {
                self.error_count = self.error_count.saturating_add(1);
                self.last_error_at = Some(now);
            }
            FailureKind::Permanent => {}
        }
    }
}

impl std::fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("secret", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .field("last_error_at", &self.last_error_at)
            .field("error_count", &self.error_count)
            .field("active", &self.active)
            .finish()
    }
}
