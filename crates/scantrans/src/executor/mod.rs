//! Single external-call attempts against the OCR / translation provider.
//!
//! The executor picks a credential from the pool, performs one call through
//! [`ProviderApi`], reports the outcome back to the pool and returns a
//! classified [`StageOutcome`]. It never decides whether to retry.

pub mod api;
pub mod stage;

pub use api::{ApiError, ImageHandle, ProviderApi};
pub use stage::{StageCall, StageExecutor, StageOutcome, DEFAULT_CALL_TIMEOUT};
