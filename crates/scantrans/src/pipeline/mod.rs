//! Document orchestration: drives one document through OCR and optional
//! translation, persisting every status transition before taking the next.

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::OrchestratorConfig;
pub use context::{RunOutcome, RunRequest, TranslationRequest};
pub use error::OrchestratorError;
pub use progress::{StatusBroadcaster, StatusUpdate};
pub use runner::{Orchestrator, RunHandle};
