use sha2::{Digest, Sha256};

/// Field separator. Not expected to occur in language codes or model ids.
const DELIMITER: &str = "|";

/// Computes the cache key for a translation request.
///
/// `SHA-256(text | source | target | model)` as 64 lowercase hex chars.
/// Inputs are hashed verbatim: callers must normalize text and language codes
/// consistently before calling, the cache does not.
pub fn fingerprint(text: &str, source_lang: &str, target_lang: &str, model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(DELIMITER.as_bytes());
    hasher.update(source_lang.as_bytes());
    hasher.update(DELIMITER.as_bytes());
    hasher.update(target_lang.as_bytes());
    hasher.update(DELIMITER.as_bytes());
    hasher.update(model_id.as_bytes());
    hex::encode(hasher.finalize())
}
