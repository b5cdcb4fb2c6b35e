//! In-process store, for embedding without a database and for tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{CacheStore, CredentialStore, DocumentRecord, DocumentStore, StoreError};
use crate::cache::CacheEntry;
use crate::credentials::CredentialEntry;
use crate::status::ProcessingStatus;

#[derive(Default)]
struct State {
    documents: HashMap<String, DocumentRecord>,
    cache: HashMap<String, CacheEntry>,
    credentials: Vec<CredentialEntry>,
}

/// Implements every store trait over plain collections.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the credential list, e.g. from configuration.
    pub fn with_credentials(credentials: Vec<CredentialEntry>) -> Self {
        Self {
            state: Mutex::new(State {
                credentials,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn cache_len(&self) -> usize {
        self.lock().map(|s| s.cache.len()).unwrap_or(0)
    }

    fn update_document<F>(&self, id: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut DocumentRecord),
    {
        let mut state = self.lock()?;
        let record = state
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, id: &str) -> Result<DocumentRecord, StoreError> {
        let mut state = self.lock()?;
        let record = state
            .documents
            .entry(id.to_string())
            .or_insert_with(|| DocumentRecord::new(id));
        Ok(record.clone())
    }

    async fn load_document(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.lock()?.documents.get(id).cloned())
    }

    async fn save_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update_document(id, |record| {
            record.status = status;
            record.detail = detail.map(str::to_string);
        })
    }

    async fn save_ocr_text(&self, id: &str, text: &str) -> Result<(), StoreError> {
        self.update_document(id, |record| record.ocr_text = Some(text.to_string()))
    }

    async fn save_translation(&self, id: &str, text: &str) -> Result<(), StoreError> {
        self.update_document(id, |record| {
            record.translated_text = Some(text.to_string())
        })
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.lock()?.cache.get(key).cloned())
    }

    async fn save_cache_entry(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.lock()?.cache.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn sweep_expired_cache_entries(&self, ttl: chrono::Duration) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.lock()?;
        let before = state.cache.len();
        state.cache.retain(|_, entry| !entry.is_expired_at(ttl, now));
        Ok((before - state.cache.len()) as u64)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn list_credentials(&self) -> Result<Vec<CredentialEntry>, StoreError> {
        Ok(self.lock()?.credentials.clone())
    }

    async fn persist_credential(&self, entry: &CredentialEntry) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        match state.credentials.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => state.credentials.push(entry.clone()),
        }
        Ok(())
    }
}
