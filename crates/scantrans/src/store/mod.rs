//! Persistence interfaces consumed by the orchestration core.
//!
//! The core never talks to a storage engine directly. It depends on these
//! traits, which are implemented by the SQLite [`Database`](crate::db::Database)
//! and by the in-process [`MemoryStore`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::CacheEntry;
use crate::credentials::CredentialEntry;
use crate::db::DatabaseError;
use crate::secrets::SecretError;
use crate::status::ProcessingStatus;

pub use memory::MemoryStore;

/// Errors surfaced by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Document '{0}' not found")]
    DocumentNotFound(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),
}

/// Persisted state of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub status: ProcessingStatus,
    /// Human-readable detail attached to the latest status.
    pub detail: Option<String>,
    /// OCR output, kept so a later run can resume after OCR.
    pub ocr_text: Option<String>,
    pub translated_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            status: ProcessingStatus::Pending,
            detail: None,
            ocr_text: None,
            translated_text: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Document status persistence.
///
/// `save_status` must only return once the write is durable: the orchestrator
/// does not take the next transition before that.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the document as `Pending`. Returns the existing record unchanged
    /// if the id is already known.
    async fn create_document(&self, id: &str) -> Result<DocumentRecord, StoreError>;

    async fn load_document(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError>;

    async fn load_status(&self, id: &str) -> Result<ProcessingStatus, StoreError> {
        self.load_document(id)
            .await?
            .map(|record| record.status)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))
    }

    async fn save_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        detail: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn save_ocr_text(&self, id: &str, text: &str) -> Result<(), StoreError>;

    async fn save_translation(&self, id: &str, text: &str) -> Result<(), StoreError>;
}

/// Key-value persistence behind the translation cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Upsert keyed by `entry.key`; last write wins.
    async fn save_cache_entry(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Deletes entries written more than `ttl` ago. Returns how many were removed.
    async fn sweep_expired_cache_entries(&self, ttl: chrono::Duration) -> Result<u64, StoreError>;
}

/// Credential persistence. Implementations own encryption at rest; the core
/// only ever sees plaintext entries.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn list_credentials(&self) -> Result<Vec<CredentialEntry>, StoreError>;

    async fn persist_credential(&self, entry: &CredentialEntry) -> Result<(), StoreError>;
}
