//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Logs are safe to share for debugging. These functions ensure no credential
//! secrets or document contents leak into events or spans.

use sha2::{Digest, Sha256};

/// Returns a short deterministic tag for a credential id.
///
/// Lets operators correlate log lines for one credential without exposing
/// anything about the secret itself.
pub fn credential_tag(id: &str) -> String {
    let digest = Sha256::digest(id.as_bytes());
    hex::encode(&digest[..4])
}

/// Describes a piece of document text by size only.
pub fn text_summary(text: &str) -> String {
    format!("{} chars", text.chars().count())
}

/// Shortens a cache fingerprint for log output.
pub fn short_key(key: &str) -> &str {
    let end = key
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(key.len());
    &key[..end]
}
