//! Provider fake with scripted replies.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use scantrans::credentials::CredentialEntry;
use scantrans::executor::{ApiError, ImageHandle, ProviderApi};
use scantrans::status::Stage;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub stage: Stage,
    pub credential_id: String,
}

/// Replays scripted replies per stage; once a script runs dry every call
/// succeeds with a deterministic echo of its input.
#[derive(Default)]
pub struct ScriptedApi {
    ocr: Mutex<VecDeque<Result<String, ApiError>>>,
    translate: Mutex<VecDeque<Result<String, ApiError>>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr(self, replies: Vec<Result<String, ApiError>>) -> Self {
        *self.ocr.lock().unwrap() = replies.into();
        self
    }

    pub fn with_translate(self, replies: Vec<Result<String, ApiError>>) -> Self {
        *self.translate.lock().unwrap() = replies.into();
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: Stage) -> Vec<CallRecord> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .collect()
    }

    fn record(&self, stage: Stage, credential: &CredentialEntry) {
        self.calls.lock().unwrap().push(CallRecord {
            stage,
            credential_id: credential.id.clone(),
        });
    }
}

#[async_trait]
impl ProviderApi for ScriptedApi {
    async fn call_ocr(
        &self,
        image: &ImageHandle,
        credential: &CredentialEntry,
    ) -> Result<String, ApiError> {
        self.record(Stage::Ocr, credential);
        self.ocr
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("text of {}", image.id)))
    }

    async fn call_translate(
        &self,
        text: &str,
        _source_lang: &str,
        target_lang: &str,
        _model_id: &str,
        credential: &CredentialEntry,
    ) -> Result<String, ApiError> {
        self.record(Stage::Translation, credential);
        self.translate
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("[{}] {}", target_lang, text)))
    }
}
