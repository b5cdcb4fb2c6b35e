//! Test harness wiring an orchestrator over in-memory stores.

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::broadcast;

use scantrans::cache::TranslationCache;
use scantrans::credentials::{CredentialEntry, CredentialPool, PoolPolicy};
use scantrans::executor::StageExecutor;
use scantrans::pipeline::{Orchestrator, OrchestratorConfig, StatusUpdate};
use scantrans::status::ProcessingStatus;
use scantrans::store::MemoryStore;

use super::scripted_api::ScriptedApi;

pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub store: Arc<MemoryStore>,
    pub api: Arc<ScriptedApi>,
    pub pool: Arc<CredentialPool>,
}

impl TestHarness {
    /// Harness with `entries` in the pool and default policy and config.
    pub fn new(api: ScriptedApi, entries: Vec<CredentialEntry>) -> Self {
        Self::with_config(api, entries, OrchestratorConfig::default())
    }

    pub fn with_config(
        api: ScriptedApi,
        entries: Vec<CredentialEntry>,
        config: OrchestratorConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::with_credentials(entries.clone()));
        let pool = Arc::new(CredentialPool::with_entries(PoolPolicy::default(), entries));
        let api = Arc::new(api);
        let executor = Arc::new(
            StageExecutor::new(pool.clone(), api.clone()).with_credential_store(store.clone()),
        );
        let cache = Arc::new(TranslationCache::with_defaults(store.clone()));
        let orchestrator = Orchestrator::new(store.clone(), cache, executor, config);

        Self {
            orchestrator,
            store,
            api,
            pool,
        }
    }
}

/// Statuses currently queued on a receiver, in order.
pub fn drain_statuses(rx: &mut broadcast::Receiver<StatusUpdate>) -> Vec<ProcessingStatus> {
    let mut seen = Vec::new();
    while let Ok(update) = rx.try_recv() {
        seen.push(update.status);
    }
    seen
}
