//! Resilient OCR and translation orchestration.
//!
//! Drives documents through a persisted [`ProcessingStatus`] state machine,
//! rotating provider credentials from a health-tracked [`CredentialPool`] and
//! reusing translations through a content-addressed [`TranslationCache`].

pub mod cache;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod status;
pub mod store;

pub use cache::{fingerprint, CacheEntry, CacheSweeper, TranslationCache};
pub use config::{build_credentials, load_config, Config};
pub use credentials::{CredentialEntry, CredentialPool, FailureKind, PoolError, PoolPolicy};
pub use db::{Database, EncryptedCredentialStore};
pub use error::{ConfigError, Result, ScantransError};
pub use executor::{ApiError, ImageHandle, ProviderApi, StageExecutor, StageOutcome};
pub use pipeline::{
    Orchestrator, OrchestratorConfig, OrchestratorError, RunHandle, RunOutcome, RunRequest,
    StatusUpdate, TranslationRequest,
};
pub use secrets::{resolve_secret, SecretCipher, SecretError};
pub use status::{ProcessingStatus, Stage};
pub use store::{CacheStore, CredentialStore, DocumentStore, MemoryStore, StoreError};
