use crate::executor::ImageHandle;
use crate::status::ProcessingStatus;

/// What a run should do with a document.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub image: ImageHandle,
    /// `None` ends the run at OCR.
    pub translation: Option<TranslationRequest>,
}

impl RunRequest {
    pub fn ocr_only(image: ImageHandle) -> Self {
        Self {
            image,
            translation: None,
        }
    }

    pub fn with_translation(image: ImageHandle, translation: TranslationRequest) -> Self {
        Self {
            image,
            translation: Some(translation),
        }
    }
}

/// Language codes are hashed verbatim into the cache key, so callers should
/// pass them normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub source_lang: String,
    pub target_lang: String,
    /// Defaults to the configured default model.
    pub model_id: Option<String>,
}

impl TranslationRequest {
    pub fn new(source_lang: &str, target_lang: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            model_id: None,
        }
    }

    pub fn with_model(mut self, model_id: &str) -> Self {
        self.model_id = Some(model_id.to_string());
        self
    }
}

/// Where a run left the document.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub document_id: String,
    /// Last persisted status. May be a stage failure when the run stopped early.
    pub status: ProcessingStatus,
    pub detail: Option<String>,
    pub ocr_text: Option<String>,
    pub translated_text: Option<String>,
    /// The translation came from the cache.
    pub from_cache: bool,
}

/// Per-run working state, owned by the run's task.
pub(crate) struct RunContext {
    pub document_id: String,
    pub status: ProcessingStatus,
    pub detail: Option<String>,
    pub ocr_text: Option<String>,
    pub translated_text: Option<String>,
    pub from_cache: bool,
}

impl RunContext {
    pub fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            document_id: self.document_id,
            status: self.status,
            detail: self.detail,
            ocr_text: self.ocr_text,
            translated_text: self.translated_text,
            from_cache: self.from_cache,
        }
    }
}
