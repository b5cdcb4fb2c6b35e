//! Credential repository for the `credentials` table.
//!
//! Secrets are stored sealed; only [`EncryptedCredentialStore`] sees both the
//! cipher and the plaintext.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::credentials::CredentialEntry;
use crate::secrets::SecretCipher;
use crate::store::{CredentialStore, StoreError};

/// A raw credential row. `encrypted_secret` is the sealed hex string.
#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub id: String,
    pub label: String,
    pub encrypted_secret: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub last_error_at: Option<String>,
    pub error_count: i64,
    pub active: bool,
    pub updated_at: String,
}

pub fn upsert(db: &Database, row: &CredentialRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO credentials (id, label, encrypted_secret, created_at, last_used_at,
             last_error_at, error_count, active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               label = ?2,
               encrypted_secret = ?3,
               last_used_at = ?5,
               last_error_at = ?6,
               error_count = ?7,
               active = ?8,
               updated_at = ?9",
            params![
                row.id,
                row.label,
                row.encrypted_secret,
                row.created_at,
                row.last_used_at,
                row.last_error_at,
                row.error_count,
                row.active,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// All rows in creation order.
pub fn list(db: &Database) -> Result<Vec<CredentialRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, label, encrypted_secret, created_at, last_used_at, last_error_at,
             error_count, active, updated_at
             FROM credentials ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CredentialRow {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    encrypted_secret: row.get(2)?,
                    created_at: row.get(3)?,
                    last_used_at: row.get(4)?,
                    last_error_at: row.get(5)?,
                    error_count: row.get(6)?,
                    active: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns true if a row was deleted.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    })
}

/// [`CredentialStore`] over SQLite with AES-256-GCM sealed secrets.
#[derive(Clone)]
pub struct EncryptedCredentialStore {
    db: Database,
    cipher: Arc<SecretCipher>,
}

impl EncryptedCredentialStore {
    pub fn new(db: Database, cipher: SecretCipher) -> Self {
        Self {
            db,
            cipher: Arc::new(cipher),
        }
    }

    /// Uses the key from `SCANTRANS_CREDENTIAL_KEY`.
    pub fn from_env(db: Database) -> Result<Self, StoreError> {
        Ok(Self::new(db, SecretCipher::from_env()?))
    }

    pub async fn delete_credential(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        Ok(self.db.run_blocking(move |db| delete(db, &id)).await?)
    }

    fn seal(&self, entry: &CredentialEntry) -> Result<CredentialRow, StoreError> {
        Ok(CredentialRow {
            id: entry.id.clone(),
            label: entry.label.clone(),
            encrypted_secret: self.cipher.encrypt(entry.secret())?,
            created_at: format_timestamp(entry.created_at),
            last_used_at: entry.last_used_at.map(format_timestamp),
            last_error_at: entry.last_error_at.map(format_timestamp),
            error_count: i64::from(entry.error_count),
            active: entry.active,
            updated_at: format_timestamp(Utc::now()),
        })
    }

    fn open(&self, row: CredentialRow) -> Result<CredentialEntry, StoreError> {
        let corrupt = |field: &str| {
            StoreError::Corrupt(format!("credential '{}' has invalid {}", row.label, field))
        };

        let created_at = parse_timestamp(&row.created_at).ok_or_else(|| corrupt("created_at"))?;
        let last_used_at = match &row.last_used_at {
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| corrupt("last_used_at"))?),
            None => None,
        };
        let last_error_at = match &row.last_error_at {
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| corrupt("last_error_at"))?),
            None => None,
        };
        let error_count = u32::try_from(row.error_count).map_err(|_| corrupt("error_count"))?;
        let secret = self.cipher.decrypt(&row.encrypted_secret)?;

        let mut entry = CredentialEntry::with_id(&row.id, &row.label, secret, created_at);
        entry.last_used_at = last_used_at;
        entry.last_error_at = last_error_at;
        entry.error_count = error_count;
        entry.active = row.active;
        Ok(entry)
    }
}

#[async_trait]
impl CredentialStore for EncryptedCredentialStore {
    async fn list_credentials(&self) -> Result<Vec<CredentialEntry>, StoreError> {
        let rows = self.db.run_blocking(list).await?;
        rows.into_iter().map(|row| self.open(row)).collect()
    }

    async fn persist_credential(&self, entry: &CredentialEntry) -> Result<(), StoreError> {
        let row = self.seal(entry)?;
        self.db.run_blocking(move |db| upsert(db, &row)).await?;
        Ok(())
    }
}
