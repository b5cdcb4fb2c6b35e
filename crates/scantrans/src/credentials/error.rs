use thiserror::Error;

/// Errors from credential pool operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No active entry is currently eligible for selection.
    #[error("credentials exhausted: no eligible credential available")]
    NoCredentialsAvailable,

    #[error("Unknown credential '{0}'")]
    UnknownCredential(String),

    #[error("Credential pool lock poisoned")]
    LockPoisoned,
}
