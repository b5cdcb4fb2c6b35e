//! API credential pool with health tracking and failover.
//!
//! The pool owns a set of interchangeable provider credentials. Each external
//! call asks the pool for the most eligible entry and reports the outcome
//! back, which keeps error counts and cooldowns accurate across all
//! concurrently running documents.

pub mod entry;
pub mod error;
pub mod pool;

pub use entry::{CredentialEntry, FailureKind};
pub use error::PoolError;
pub use pool::{CredentialPool, PoolPolicy, PoolStats};
