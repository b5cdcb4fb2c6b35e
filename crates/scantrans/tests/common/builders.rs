//! Builders for credentials and run requests.

#![allow(dead_code)]

use secrecy::SecretString;

use scantrans::credentials::CredentialEntry;
use scantrans::executor::ImageHandle;
use scantrans::pipeline::{RunRequest, TranslationRequest};

/// `count` fresh, active credentials labelled `key-0`, `key-1`, ...
pub fn credentials(count: usize) -> Vec<CredentialEntry> {
    (0..count)
        .map(|i| {
            CredentialEntry::new(
                format!("key-{}", i),
                SecretString::from(format!("sk-test-{}", i)),
            )
        })
        .collect()
}

/// `count` credentials that have been deactivated.
pub fn inactive_credentials(count: usize) -> Vec<CredentialEntry> {
    credentials(count)
        .into_iter()
        .map(|mut entry| {
            entry.active = false;
            entry
        })
        .collect()
}

pub fn scan(id: &str) -> ImageHandle {
    ImageHandle::new(id, vec![0x89u8, 0x50, 0x4e, 0x47])
}

pub fn ocr_request(image_id: &str) -> RunRequest {
    RunRequest::ocr_only(scan(image_id))
}

pub fn translate_request(image_id: &str, source: &str, target: &str) -> RunRequest {
    RunRequest::with_translation(scan(image_id), TranslationRequest::new(source, target))
}
