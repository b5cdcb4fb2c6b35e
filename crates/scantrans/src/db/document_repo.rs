//! Document repository: status and stage results for the `documents` table.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::status::ProcessingStatus;
use crate::store::{DocumentRecord, DocumentStore, StoreError};

/// A raw document row.
#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: String,
    pub status: i64,
    pub detail: Option<String>,
    pub ocr_text: Option<String>,
    pub translated_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            detail: row.get("detail")?,
            ocr_text: row.get("ocr_text")?,
            translated_text: row.get("translated_text")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn into_record(self) -> Result<DocumentRecord, StoreError> {
        let status = ProcessingStatus::from_int(self.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "document '{}' has unknown status code {}",
                self.id, self.status
            ))
        })?;
        let created_at = parse_timestamp(&self.created_at).ok_or_else(|| {
            StoreError::Corrupt(format!("document '{}' has invalid created_at", self.id))
        })?;
        let updated_at = parse_timestamp(&self.updated_at).ok_or_else(|| {
            StoreError::Corrupt(format!("document '{}' has invalid updated_at", self.id))
        })?;

        Ok(DocumentRecord {
            id: self.id,
            status,
            detail: self.detail,
            ocr_text: self.ocr_text,
            translated_text: self.translated_text,
            created_at,
            updated_at,
        })
    }
}

/// Inserts a `Pending` document unless the id already exists.
pub fn insert_if_absent(db: &Database, id: &str) -> Result<(), DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO NOTHING",
            params![id, ProcessingStatus::Pending.to_int(), now],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, id: &str) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT id, status, detail, ocr_text, translated_text, created_at, updated_at
                 FROM documents WHERE id = ?1",
                params![id],
                DocumentRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the number of rows changed (0 when the id is unknown).
pub fn update_status(
    db: &Database,
    id: &str,
    status: ProcessingStatus,
    detail: Option<&str>,
) -> Result<usize, DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = ?2, detail = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.to_int(), detail, now],
        )?;
        Ok(changed)
    })
}

pub fn update_ocr_text(db: &Database, id: &str, text: &str) -> Result<usize, DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET ocr_text = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, text, now],
        )?;
        Ok(changed)
    })
}

pub fn update_translation(db: &Database, id: &str, text: &str) -> Result<usize, DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET translated_text = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, text, now],
        )?;
        Ok(changed)
    })
}

fn require_changed(changed: usize, id: &str) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::DocumentNotFound(id.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn create_document(&self, id: &str) -> Result<DocumentRecord, StoreError> {
        let id = id.to_string();
        let row = self
            .run_blocking(move |db| {
                insert_if_absent(db, &id)?;
                find(db, &id)
            })
            .await?;
        row.ok_or_else(|| StoreError::Unavailable("inserted document not readable".to_string()))?
            .into_record()
    }

    async fn load_document(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let id = id.to_string();
        let row = self.run_blocking(move |db| find(db, &id)).await?;
        row.map(DocumentRow::into_record).transpose()
    }

    async fn save_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        detail: Option<&str>,
    ) -> Result<(), StoreError> {
        let owned_id = id.to_string();
        let detail = detail.map(str::to_string);
        let changed = self
            .run_blocking(move |db| update_status(db, &owned_id, status, detail.as_deref()))
            .await?;
        require_changed(changed, id)
    }

    async fn save_ocr_text(&self, id: &str, text: &str) -> Result<(), StoreError> {
        let (owned_id, text) = (id.to_string(), text.to_string());
        let changed = self
            .run_blocking(move |db| update_ocr_text(db, &owned_id, &text))
            .await?;
        require_changed(changed, id)
    }

    async fn save_translation(&self, id: &str, text: &str) -> Result<(), StoreError> {
        let (owned_id, text) = (id.to_string(), text.to_string());
        let changed = self
            .run_blocking(move |db| update_translation(db, &owned_id, &text))
            .await?;
        require_changed(changed, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_pending_and_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_document("doc-1").await.unwrap();
        assert_eq!(created.status, ProcessingStatus::Pending);

        db.save_status("doc-1", ProcessingStatus::Queued, None)
            .await
            .unwrap();
        let again = db.create_document("doc-1").await.unwrap();
        assert_eq!(again.status, ProcessingStatus::Queued);
        assert_eq!(again.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_status_stored_as_stable_integer() {
        let db = Database::open_in_memory().unwrap();
        db.create_document("doc").await.unwrap();
        db.save_status("doc", ProcessingStatus::TranslationFailed, Some("rate limited"))
            .await
            .unwrap();

        let raw = find(&db, "doc").unwrap().unwrap();
        assert_eq!(raw.status, 7);
        assert_eq!(raw.detail.as_deref(), Some("rate limited"));
        assert_eq!(
            db.load_status("doc").await.unwrap(),
            ProcessingStatus::TranslationFailed
        );
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.load_document("missing").await.unwrap().is_none());
        assert!(matches!(
            db.save_status("missing", ProcessingStatus::Queued, None).await,
            Err(StoreError::DocumentNotFound(_))
        ));
        assert!(matches!(
            db.save_ocr_text("missing", "x").await,
            Err(StoreError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_texts_persist() {
        let db = Database::open_in_memory().unwrap();
        db.create_document("doc").await.unwrap();
        db.save_ocr_text("doc", "Hallo Welt").await.unwrap();
        db.save_translation("doc", "Hello world").await.unwrap();

        let record = db.load_document("doc").await.unwrap().unwrap();
        assert_eq!(record.ocr_text.as_deref(), Some("Hallo Welt"));
        assert_eq!(record.translated_text.as_deref(), Some("Hello world"));
    }

    #[tokio::test]
    async fn test_corrupt_status_code() {
        let db = Database::open_in_memory().unwrap();
        db.create_document("doc").await.unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE documents SET status = 99 WHERE id = 'doc'", [])?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.load_document("doc").await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_document("doc").await.unwrap();
            db.save_status("doc", ProcessingStatus::OcrComplete, None)
                .await
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.load_status("doc").await.unwrap(),
            ProcessingStatus::OcrComplete
        );
    }
}
