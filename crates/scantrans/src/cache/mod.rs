//! Content-addressed translation cache.
//!
//! Identical `(text, source language, target language, model)` requests share
//! one SHA-256 fingerprint, so a translation is only ever paid for once until
//! its entry expires.

pub mod entry;
pub mod fingerprint;
pub mod sweeper;
pub mod translation_cache;

pub use entry::CacheEntry;
pub use fingerprint::fingerprint;
pub use sweeper::CacheSweeper;
pub use translation_cache::{CacheStats, TranslationCache, DEFAULT_TTL_DAYS, MAX_TTL_DAYS};
