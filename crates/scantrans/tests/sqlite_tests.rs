//! Orchestration against the SQLite stores, including restarts.

mod common;

use std::sync::Arc;

use common::{credentials, ocr_request, translate_request, ScriptedApi};
use scantrans::cache::TranslationCache;
use scantrans::credentials::{CredentialPool, PoolPolicy};
use scantrans::db::{Database, EncryptedCredentialStore};
use scantrans::executor::{ApiError, StageExecutor};
use scantrans::pipeline::{Orchestrator, OrchestratorConfig};
use scantrans::secrets::SecretCipher;
use scantrans::status::{ProcessingStatus, Stage};
use scantrans::store::{CredentialStore, DocumentStore};

const TEST_KEY: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

struct Node {
    db: Database,
    orchestrator: Orchestrator,
    pool: Arc<CredentialPool>,
    api: Arc<ScriptedApi>,
}

async fn node(path: &std::path::Path, api: ScriptedApi) -> Node {
    let db = Database::open(path).unwrap();
    let credential_store = Arc::new(EncryptedCredentialStore::new(
        db.clone(),
        SecretCipher::from_hex_key(TEST_KEY).unwrap(),
    ));

    let pool = Arc::new(CredentialPool::new(PoolPolicy::default()));
    if pool.load_from(credential_store.as_ref()).await.unwrap() == 0 {
        for entry in credentials(2) {
            credential_store.persist_credential(&entry).await.unwrap();
            pool.add(entry).unwrap();
        }
    }

    let api = Arc::new(api);
    let executor = Arc::new(
        StageExecutor::new(pool.clone(), api.clone()).with_credential_store(credential_store),
    );
    let store = Arc::new(db.clone());
    let cache = Arc::new(TranslationCache::with_defaults(store.clone()));
    let orchestrator = Orchestrator::new(store, cache, executor, OrchestratorConfig::default());

    Node {
        db,
        orchestrator,
        pool,
        api,
    }
}

#[tokio::test]
async fn test_full_run_persists_everything() {
    let dir = tempfile::tempdir().unwrap();
    let n = node(&dir.path().join("scantrans.db"), ScriptedApi::new()).await;

    n.orchestrator.create_document("doc").await.unwrap();
    let outcome = n
        .orchestrator
        .run("doc", translate_request("doc", "de", "en"))
        .await
        .unwrap();
    assert_eq!(outcome.status, ProcessingStatus::Complete);

    let record = n.db.load_document("doc").await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Complete);
    assert_eq!(record.ocr_text.as_deref(), Some("text of doc"));
    assert_eq!(record.translated_text.as_deref(), Some("[en] text of doc"));
}

#[tokio::test]
async fn test_cache_and_credential_health_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scantrans.db");

    let failing_id = {
        let api = ScriptedApi::new().with_ocr(vec![Err(ApiError::RateLimited("429".into()))]);
        let n = node(&path, api).await;
        n.orchestrator.create_document("first").await.unwrap();
        n.orchestrator
            .run("first", translate_request("scan", "de", "en"))
            .await
            .unwrap();
        n.api.calls_for(Stage::Ocr)[0].credential_id.clone()
    };

    let n = node(&path, ScriptedApi::new()).await;

    let reloaded = n.pool.get(&failing_id).unwrap().unwrap();
    assert_eq!(reloaded.error_count, 1);
    assert_eq!(n.pool.len(), 2);

    n.orchestrator.create_document("second").await.unwrap();
    let outcome = n
        .orchestrator
        .run("second", translate_request("scan", "de", "en"))
        .await
        .unwrap();
    assert!(outcome.from_cache);
    assert!(n.api.calls_for(Stage::Translation).is_empty());
}

#[tokio::test]
async fn test_interrupted_run_resumes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scantrans.db");

    {
        let db = Database::open(&path).unwrap();
        db.create_document("doc").await.unwrap();
        db.save_status("doc", ProcessingStatus::Queued, None)
            .await
            .unwrap();
        db.save_status("doc", ProcessingStatus::OcrInProgress, None)
            .await
            .unwrap();
    }

    let n = node(&path, ScriptedApi::new()).await;
    let mut rx = n.orchestrator.subscribe();
    let outcome = n.orchestrator.run("doc", ocr_request("doc")).await.unwrap();

    assert_eq!(outcome.status, ProcessingStatus::Complete);
    assert_eq!(
        common::drain_statuses(&mut rx),
        vec![
            ProcessingStatus::OcrFailed,
            ProcessingStatus::OcrInProgress,
            ProcessingStatus::OcrComplete,
            ProcessingStatus::Complete
        ]
    );
}
