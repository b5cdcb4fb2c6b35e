use thiserror::Error;

use crate::credentials::PoolError;
use crate::status::ProcessingStatus;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Document '{0}' already has an active run")]
    AlreadyRunning(String),

    #[error("Document '{id}' is already in terminal state {status}")]
    AlreadyTerminal { id: String, status: ProcessingStatus },

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Unknown translation model '{0}'")]
    UnknownModel(String),

    #[error("Document '{0}' has no stored OCR text to resume from")]
    MissingOcrText(String),

    #[error("Illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    /// A status write failed. The run stops: continuing would break the
    /// durable ordering of persisted states.
    #[error("Failed to persist status: {0}")]
    Persistence(#[from] StoreError),

    #[error("Credential pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Run registry lock poisoned")]
    LockPoisoned,

    #[error("Run task failed: {0}")]
    TaskFailed(String),
}
