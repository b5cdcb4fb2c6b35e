//! Translation cache rows.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::cache::CacheEntry;
use crate::store::{CacheStore, StoreError};

/// A raw cache row; `written_at` as stored.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub original_text: String,
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    pub model_id: String,
    pub written_at: String,
}

impl CacheRow {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            original_text: entry.original_text.clone(),
            translated_text: entry.translated_text.clone(),
            source_language: entry.source_language.clone(),
            target_language: entry.target_language.clone(),
            model_id: entry.model_id.clone(),
            written_at: format_timestamp(entry.written_at),
        }
    }

    fn into_entry(self) -> Result<CacheEntry, StoreError> {
        let written_at = parse_timestamp(&self.written_at).ok_or_else(|| {
            StoreError::Corrupt(format!("cache entry has invalid written_at '{}'", self.written_at))
        })?;
        Ok(CacheEntry {
            key: self.key,
            original_text: self.original_text,
            translated_text: self.translated_text,
            source_language: self.source_language,
            target_language: self.target_language,
            model_id: self.model_id,
            written_at,
        })
    }
}

pub fn find(db: &Database, key: &str) -> Result<Option<CacheRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT key, original_text, translated_text, source_language, target_language,
                 model_id, written_at
                 FROM translation_cache WHERE key = ?1",
                params![key],
                |row| {
                    Ok(CacheRow {
                        key: row.get(0)?,
                        original_text: row.get(1)?,
                        translated_text: row.get(2)?,
                        source_language: row.get(3)?,
                        target_language: row.get(4)?,
                        model_id: row.get(5)?,
                        written_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Last write wins.
pub fn upsert(db: &Database, row: &CacheRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO translation_cache (key, original_text, translated_text, source_language,
             target_language, model_id, written_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(key) DO UPDATE SET
               original_text = ?2,
               translated_text = ?3,
               source_language = ?4,
               target_language = ?5,
               model_id = ?6,
               written_at = ?7",
            params![
                row.key,
                row.original_text,
                row.translated_text,
                row.source_language,
                row.target_language,
                row.model_id,
                row.written_at,
            ],
        )?;
        Ok(())
    })
}

/// Deletes rows written strictly before `cutoff` (same text format as stored).
pub fn delete_written_before(db: &Database, cutoff: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM translation_cache WHERE written_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    })
}

#[async_trait]
impl CacheStore for Database {
    async fn load_cache_entry(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let key = key.to_string();
        let row = self.run_blocking(move |db| find(db, &key)).await?;
        row.map(CacheRow::into_entry).transpose()
    }

    async fn save_cache_entry(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let row = CacheRow::from_entry(entry);
        self.run_blocking(move |db| upsert(db, &row)).await?;
        Ok(())
    }

    async fn sweep_expired_cache_entries(&self, ttl: chrono::Duration) -> Result<u64, StoreError> {
        let cutoff = format_timestamp(Utc::now() - ttl);
        let deleted = self
            .run_blocking(move |db| delete_written_before(db, &cutoff))
            .await?;
        Ok(deleted as u64)
    }
}
