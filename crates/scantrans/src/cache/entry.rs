use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A stored translation, keyed by its request fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub original_text: String,
    pub translated_text: String,
    pub source_language: String,
    pub target_language: String,
    pub model_id: String,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        key: &str,
        original_text: &str,
        translated_text: &str,
        source_language: &str,
        target_language: &str,
        model_id: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            original_text: original_text.to_string(),
            translated_text: translated_text.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            model_id: model_id.to_string(),
            written_at: Utc::now(),
        }
    }

    /// Expired once strictly more than `ttl` has passed since the write.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.written_at > ttl
    }
}
