//! Shared test utilities for scantrans integration tests.
//!
//! This module provides:
//! - `ScriptedApi`, a provider fake that replays scripted replies and records calls
//! - `TestHarness` wiring an `Orchestrator` over in-memory stores
//! - Builders for credentials and run requests

pub mod builders;
pub mod harness;
pub mod scripted_api;

pub use builders::*;
pub use harness::{drain_statuses, TestHarness};
pub use scripted_api::{CallRecord, ScriptedApi};
