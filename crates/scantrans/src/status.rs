//! Document processing lifecycle.
//!
//! A document moves forward through OCR and (optionally) translation. The
//! integer codes in [`ProcessingStatus::to_int`] are persisted and must never
//! be reassigned; new variants get new codes.

use serde::{Deserialize, Serialize};

/// Where a document is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Queued,
    OcrInProgress,
    OcrComplete,
    OcrFailed,
    TranslationInProgress,
    TranslationComplete,
    TranslationFailed,
    Complete,
    Cancelled,
    Error,
}

impl ProcessingStatus {
    /// Every status, in persisted-code order.
    pub const ALL: [ProcessingStatus; 11] = [
        ProcessingStatus::Pending,
        ProcessingStatus::Queued,
        ProcessingStatus::OcrInProgress,
        ProcessingStatus::OcrComplete,
        ProcessingStatus::OcrFailed,
        ProcessingStatus::TranslationInProgress,
        ProcessingStatus::TranslationComplete,
        ProcessingStatus::TranslationFailed,
        ProcessingStatus::Complete,
        ProcessingStatus::Cancelled,
        ProcessingStatus::Error,
    ];

    /// Stable persisted code.
    pub fn to_int(self) -> i64 {
        match self {
            ProcessingStatus::Pending => 0,
            ProcessingStatus::Queued => 1,
            ProcessingStatus::OcrInProgress => 2,
            ProcessingStatus::OcrComplete => 3,
            ProcessingStatus::OcrFailed => 4,
            ProcessingStatus::TranslationInProgress => 5,
            ProcessingStatus::TranslationComplete => 6,
            ProcessingStatus::TranslationFailed => 7,
            ProcessingStatus::Complete => 8,
            ProcessingStatus::Cancelled => 9,
            ProcessingStatus::Error => 10,
        }
    }

    /// Inverse of [`to_int`](Self::to_int). Unknown codes yield `None`.
    pub fn from_int(code: i64) -> Option<Self> {
        Some(match code {
            0 => ProcessingStatus::Pending,
            1 => ProcessingStatus::Queued,
            2 => ProcessingStatus::OcrInProgress,
            3 => ProcessingStatus::OcrComplete,
            4 => ProcessingStatus::OcrFailed,
            5 => ProcessingStatus::TranslationInProgress,
            6 => ProcessingStatus::TranslationComplete,
            7 => ProcessingStatus::TranslationFailed,
            8 => ProcessingStatus::Complete,
            9 => ProcessingStatus::Cancelled,
            10 => ProcessingStatus::Error,
            _ => return None,
        })
    }

    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Complete | ProcessingStatus::Cancelled | ProcessingStatus::Error
        )
    }

    /// Failed stage statuses: a run may stop here, a later run may retry.
    pub fn is_failed_stage(self) -> bool {
        matches!(
            self,
            ProcessingStatus::OcrFailed | ProcessingStatus::TranslationFailed
        )
    }

    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;

        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }

        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, OcrInProgress)
                | (OcrInProgress, OcrComplete)
                | (OcrInProgress, OcrFailed)
                | (OcrFailed, OcrInProgress)
                | (OcrFailed, Error)
                | (OcrComplete, TranslationInProgress)
                | (OcrComplete, Complete)
                | (TranslationInProgress, TranslationComplete)
                | (TranslationInProgress, TranslationFailed)
                | (TranslationFailed, TranslationInProgress)
                | (TranslationFailed, Error)
                | (TranslationComplete, Complete)
        )
    }

    /// Stable snake_case name, as used in logs and serialized events.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Queued => "queued",
            ProcessingStatus::OcrInProgress => "ocr_in_progress",
            ProcessingStatus::OcrComplete => "ocr_complete",
            ProcessingStatus::OcrFailed => "ocr_failed",
            ProcessingStatus::TranslationInProgress => "translation_in_progress",
            ProcessingStatus::TranslationComplete => "translation_complete",
            ProcessingStatus::TranslationFailed => "translation_failed",
            ProcessingStatus::Complete => "complete",
            ProcessingStatus::Cancelled => "cancelled",
            ProcessingStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "Pending"),
            ProcessingStatus::Queued => write!(f, "Queued"),
            ProcessingStatus::OcrInProgress => write!(f, "OCR in progress"),
            ProcessingStatus::OcrComplete => write!(f, "OCR complete"),
            ProcessingStatus::OcrFailed => write!(f, "OCR failed"),
            ProcessingStatus::TranslationInProgress => write!(f, "Translation in progress"),
            ProcessingStatus::TranslationComplete => write!(f, "Translation complete"),
            ProcessingStatus::TranslationFailed => write!(f, "Translation failed"),
            ProcessingStatus::Complete => write!(f, "Complete"),
            ProcessingStatus::Cancelled => write!(f, "Cancelled"),
            ProcessingStatus::Error => write!(f, "Error"),
        }
    }
}

/// One of the two external-call stages a document goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ocr,
    Translation,
}

impl Stage {
    pub fn in_progress(self) -> ProcessingStatus {
        match self {
            Stage::Ocr => ProcessingStatus::OcrInProgress,
            Stage::Translation => ProcessingStatus::TranslationInProgress,
        }
    }

    pub fn complete(self) -> ProcessingStatus {
        match self {
            Stage::Ocr => ProcessingStatus::OcrComplete,
            Stage::Translation => ProcessingStatus::TranslationComplete,
        }
    }

    pub fn failed(self) -> ProcessingStatus {
        match self {
            Stage::Ocr => ProcessingStatus::OcrFailed,
            Stage::Translation => ProcessingStatus::TranslationFailed,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Ocr => "ocr",
            Stage::Translation => "translation",
        }
    }
}
