use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::fingerprint::fingerprint;
use crate::sanitize;
use crate::store::{CacheStore, StoreError};

/// Default entry lifetime.
pub const DEFAULT_TTL_DAYS: u64 = 30;

/// Longest accepted entry lifetime. Longer TTLs are clamped to this.
pub const MAX_TTL_DAYS: u64 = 36_500;

const SECS_PER_DAY: u64 = 24 * 3600;

/// Counters for cache effectiveness and health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads or writes that failed against the backing store.
    pub store_errors: u64,
    /// Entries currently held in the in-process layer.
    pub hot_entries: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    store_errors: AtomicU64,
}

/// Translation cache over a persistent [`CacheStore`], fronted by a bounded
/// in-process layer.
///
/// Store failures are logged and degrade to a miss (on read) or a skipped
/// write. They never surface to the caller, so a broken cache costs
/// performance, not correctness.
pub struct TranslationCache {
    store: Arc<dyn CacheStore>,
    hot: Cache<String, CacheEntry>,
    ttl: chrono::Duration,
    counters: Counters,
}

impl TranslationCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, hot_capacity: u64) -> Self {
        let max_ttl = Duration::from_secs(MAX_TTL_DAYS * SECS_PER_DAY);
        let ttl = if ttl > max_ttl {
            warn!(
                requested_days = ttl.as_secs() / SECS_PER_DAY,
                max_days = MAX_TTL_DAYS,
                "Cache TTL too long, clamping"
            );
            max_ttl
        } else {
            ttl
        };
        // In range after the clamp above.
        let chrono_ttl = chrono::Duration::from_std(ttl)
            .unwrap_or_else(|_| chrono::Duration::days(MAX_TTL_DAYS as i64));
        let hot = Cache::builder()
            .max_capacity(hot_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            store,
            hot,
            ttl: chrono_ttl,
            counters: Counters::default(),
        }
    }

    /// Cache with the default 30 day TTL.
    pub fn with_defaults(store: Arc<dyn CacheStore>) -> Self {
        Self::new(
            store,
            Duration::from_secs(DEFAULT_TTL_DAYS * SECS_PER_DAY),
            10_000,
        )
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Returns the live entry for `key`, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        if let Some(entry) = self.hot.get(key) {
            if !entry.is_expired_at(self.ttl, now) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry);
            }
            self.hot.invalidate(key);
        }

        let loaded = match self.store.load_cache_entry(key).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.record_store_error("read", key, &e);
                None
            }
        };

        match loaded {
            Some(entry) if !entry.is_expired_at(self.ttl, now) => {
                self.hot.insert(key.to_string(), entry.clone());
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            _ => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Unconditional upsert; last write wins.
    pub async fn put(&self, key: &str, mut entry: CacheEntry) {
        entry.key = key.to_string();
        self.hot.insert(key.to_string(), entry.clone());

        if let Err(e) = self.store.save_cache_entry(&entry).await {
            self.record_store_error("write", key, &e);
        } else {
            debug!(key = %sanitize::short_key(key), "Stored translation in cache");
        }
    }

    /// Fingerprints the request and looks it up.
    pub async fn lookup(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        model_id: &str,
    ) -> Option<CacheEntry> {
        let key = fingerprint(text, source_lang, target_lang, model_id);
        self.get(&key).await
    }

    /// Fingerprints the request and stores its translation.
    pub async fn store_translation(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        model_id: &str,
        translated: &str,
    ) -> CacheEntry {
        let key = fingerprint(text, source_lang, target_lang, model_id);
        let entry = CacheEntry::new(&key, text, translated, source_lang, target_lang, model_id);
        self.put(&key, entry.clone()).await;
        entry
    }

    /// Deletes expired entries from the backing store.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        let removed = self.store.sweep_expired_cache_entries(self.ttl).await?;
        self.hot.run_pending_tasks();
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            hot_entries: self.hot.entry_count(),
        }
    }

    fn record_store_error(&self, op: &str, key: &str, error: &StoreError) {
        self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            op,
            key = %sanitize::short_key(key),
            error = %error,
            "Translation cache unavailable, continuing without it"
        );
    }
}
