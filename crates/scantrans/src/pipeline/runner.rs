use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, Stream};
use tokio::sync::{broadcast, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cache::TranslationCache;
use crate::credentials::{FailureKind, PoolError};
use crate::executor::{StageCall, StageExecutor, StageOutcome};
use crate::sanitize;
use crate::status::{ProcessingStatus, Stage};
use crate::store::{DocumentStore, StoreError};

use super::config::OrchestratorConfig;
use super::context::{RunContext, RunOutcome, RunRequest, TranslationRequest};
use super::error::OrchestratorError;
use super::progress::{StatusBroadcaster, StatusUpdate};

const CREDENTIALS_EXHAUSTED: &str = "credentials exhausted";
const INTERRUPTED: &str = "interrupted";
const SERVED_FROM_CACHE: &str = "served from translation cache";

/// Cancellation signal of one active run.
#[derive(Debug, Default)]
struct RunSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl RunSignal {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

type Registry = Arc<Mutex<HashMap<String, Arc<RunSignal>>>>;

/// Holds a document's slot in the run registry; releases it on drop.
struct RunGuard {
    registry: Registry,
    document_id: String,
    signal: Arc<RunSignal>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.lock() {
            active.remove(&self.document_id);
        }
    }
}

/// Why a run stopped before reaching its natural end.
enum Interrupt {
    Cancelled,
    Failed(OrchestratorError),
}

impl From<OrchestratorError> for Interrupt {
    fn from(e: OrchestratorError) -> Self {
        Interrupt::Failed(e)
    }
}

impl From<StoreError> for Interrupt {
    fn from(e: StoreError) -> Self {
        Interrupt::Failed(e.into())
    }
}

impl From<PoolError> for Interrupt {
    fn from(e: PoolError) -> Self {
        Interrupt::Failed(e.into())
    }
}

type Step<T> = Result<T, Interrupt>;

/// How a stage ended.
enum StageEnd {
    Succeeded(String),
    /// Parked in the stage's failed state; a later run may resume it.
    Stopped,
    /// Retry budget exhausted; the document is in `Error`.
    Errored,
}

/// Handle to a run started with [`Orchestrator::start`].
#[derive(Debug)]
pub struct RunHandle {
    document_id: String,
    signal: Arc<RunSignal>,
    join: JoinHandle<Result<RunOutcome, OrchestratorError>>,
}

impl RunHandle {
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    pub async fn join(self) -> Result<RunOutcome, OrchestratorError> {
        self.join
            .await
            .map_err(|e| OrchestratorError::TaskFailed(e.to_string()))?
    }
}

/// Drives documents through OCR and translation.
///
/// Cheap to clone; clones share the registry, the concurrency limit and the
/// broadcast channel.
#[derive(Clone)]
pub struct Orchestrator {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<TranslationCache>,
    executor: Arc<StageExecutor>,
    config: Arc<OrchestratorConfig>,
    broadcaster: StatusBroadcaster,
    permits: Arc<Semaphore>,
    registry: Registry,
}

impl Orchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        cache: Arc<TranslationCache>,
        executor: Arc<StageExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        let broadcaster = StatusBroadcaster::new(config.event_capacity);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_runs.max(1)));
        Self {
            documents,
            cache,
            executor,
            config: Arc::new(config),
            broadcaster,
            permits,
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Registers a new document as `Pending`. Existing documents are returned
    /// unchanged.
    pub async fn create_document(
        &self,
        document_id: &str,
    ) -> Result<ProcessingStatus, OrchestratorError> {
        let record = self.documents.create_document(document_id).await?;
        if record.status == ProcessingStatus::Pending {
            self.broadcaster
                .send(StatusUpdate::new(document_id, record.status, None));
        }
        Ok(record.status)
    }

    /// Whether a run is currently active for the document.
    pub fn is_running(&self, document_id: &str) -> bool {
        self.registry
            .lock()
            .map(|active| active.contains_key(document_id))
            .unwrap_or(false)
    }

    /// Raw feed of every transition of every document.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.broadcaster.subscribe()
    }

    /// Runs the document to the end of this attempt on the current task.
    pub async fn run(
        &self,
        document_id: &str,
        request: RunRequest,
    ) -> Result<RunOutcome, OrchestratorError> {
        let (guard, ctx) = self.prepare(document_id, &request).await?;
        self.drive(guard, ctx, request).await
    }

    /// Spawns the run on the tokio runtime.
    ///
    /// Rejections (already running, terminal, unknown model) are returned
    /// here, before anything is spawned.
    pub async fn start(
        &self,
        document_id: &str,
        request: RunRequest,
    ) -> Result<RunHandle, OrchestratorError> {
        let (guard, ctx) = self.prepare(document_id, &request).await?;
        let signal = Arc::clone(&guard.signal);
        let this = self.clone();
        let join = tokio::spawn(async move { this.drive(guard, ctx, request).await });

        Ok(RunHandle {
            document_id: document_id.to_string(),
            signal,
            join,
        })
    }

    /// Cancels the document.
    ///
    /// An active run is signalled and stops at its next transition boundary.
    /// Otherwise a non-terminal document is moved to `Cancelled` directly.
    /// Returns `false` if the document was already terminal.
    pub async fn cancel(&self, document_id: &str) -> Result<bool, OrchestratorError> {
        let guard = {
            let mut active = self
                .registry
                .lock()
                .map_err(|_| OrchestratorError::LockPoisoned)?;
            if let Some(signal) = active.get(document_id) {
                signal.cancel();
                info!(document_id, "Cancellation requested for active run");
                return Ok(true);
            }
            self.claim_locked(&mut active, document_id)
        };

        let status = self
            .documents
            .load_status(document_id)
            .await
            .map_err(|e| not_found_or(e, document_id))?;
        if status.is_terminal() {
            drop(guard);
            return Ok(false);
        }

        self.documents
            .save_status(document_id, ProcessingStatus::Cancelled, None)
            .await?;
        self.broadcaster.send(StatusUpdate::new(
            document_id,
            ProcessingStatus::Cancelled,
            None,
        ));
        info!(document_id, from = %status, "Document cancelled");
        drop(guard);
        Ok(true)
    }

    /// Transitions of one document, starting with its current status and
    /// ending after a terminal one. Does not replay earlier history.
    pub async fn observe(
        &self,
        document_id: &str,
    ) -> Result<impl Stream<Item = StatusUpdate> + Send + 'static, OrchestratorError> {
        // Subscribe before reading so nothing falls between the two.
        let rx = self.broadcaster.subscribe();
        let record = self
            .documents
            .load_document(document_id)
            .await?
            .ok_or_else(|| OrchestratorError::DocumentNotFound(document_id.to_string()))?;

        let mut current = StatusUpdate::new(document_id, record.status, record.detail.as_deref());
        current.timestamp = record.updated_at;

        let state = ObserveState {
            document_id: document_id.to_string(),
            rx,
            since: record.updated_at,
            last: None,
            pending: Some(current),
            done: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            if let Some(update) = state.pending.take() {
                return Some(state.emit(update));
            }
            loop {
                match state.rx.recv().await {
                    Ok(update) if state.accepts(&update) => return Some(state.emit(update)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            document_id = %state.document_id,
                            skipped,
                            "Status observer lagged behind"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }

    async fn prepare(
        &self,
        document_id: &str,
        request: &RunRequest,
    ) -> Result<(RunGuard, RunContext), OrchestratorError> {
        if let Some(translation) = &request.translation {
            self.resolve_model(translation)?;
        }

        let guard = {
            let mut active = self
                .registry
                .lock()
                .map_err(|_| OrchestratorError::LockPoisoned)?;
            if active.contains_key(document_id) {
                return Err(OrchestratorError::AlreadyRunning(document_id.to_string()));
            }
            self.claim_locked(&mut active, document_id)
        };

        let record = self
            .documents
            .load_document(document_id)
            .await?
            .ok_or_else(|| OrchestratorError::DocumentNotFound(document_id.to_string()))?;

        if record.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal {
                id: document_id.to_string(),
                status: record.status,
            });
        }

        let resumes_after_ocr = matches!(
            record.status,
            ProcessingStatus::OcrComplete
                | ProcessingStatus::TranslationInProgress
                | ProcessingStatus::TranslationFailed
        );
        if resumes_after_ocr && record.ocr_text.is_none() {
            return Err(OrchestratorError::MissingOcrText(document_id.to_string()));
        }

        let ctx = RunContext {
            document_id: document_id.to_string(),
            status: record.status,
            detail: record.detail,
            ocr_text: record.ocr_text,
            translated_text: record.translated_text,
            from_cache: false,
        };
        Ok((guard, ctx))
    }

    fn claim_locked(
        &self,
        active: &mut HashMap<String, Arc<RunSignal>>,
        document_id: &str,
    ) -> RunGuard {
        let signal = Arc::new(RunSignal::default());
        active.insert(document_id.to_string(), Arc::clone(&signal));
        RunGuard {
            registry: Arc::clone(&self.registry),
            document_id: document_id.to_string(),
            signal,
        }
    }

    fn resolve_model(&self, translation: &TranslationRequest) -> Result<String, OrchestratorError> {
        self.config
            .resolve_model(translation.model_id.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                OrchestratorError::UnknownModel(
                    translation
                        .model_id
                        .clone()
                        .unwrap_or_else(|| self.config.default_model.clone()),
                )
            })
    }

    async fn drive(
        &self,
        guard: RunGuard,
        mut ctx: RunContext,
        request: RunRequest,
    ) -> Result<RunOutcome, OrchestratorError> {
        let span = info_span!("orchestrate", document_id = %ctx.document_id);
        let signal = Arc::clone(&guard.signal);

        let result = self
            .drive_stages(&mut ctx, &signal, &request)
            .instrument(span.clone())
            .await;

        match result {
            Ok(()) => {}
            Err(Interrupt::Cancelled) => {
                if !ctx.status.is_terminal() {
                    self.persist_transition(&mut ctx, ProcessingStatus::Cancelled, None)
                        .instrument(span.clone())
                        .await?;
                }
                span.in_scope(|| info!("Run cancelled"));
            }
            Err(Interrupt::Failed(e)) => {
                span.in_scope(|| warn!(error = %e, status = %ctx.status, "Run aborted"));
                return Err(e);
            }
        }

        drop(guard);
        Ok(ctx.into_outcome())
    }

    async fn drive_stages(
        &self,
        ctx: &mut RunContext,
        signal: &RunSignal,
        request: &RunRequest,
    ) -> Step<()> {
        info!(status = %ctx.status, "Run started");

        // A crash left a stage in progress.
        match ctx.status {
            ProcessingStatus::OcrInProgress => {
                self.advance(ctx, signal, ProcessingStatus::OcrFailed, Some(INTERRUPTED))
                    .await?
            }
            ProcessingStatus::TranslationInProgress => {
                self.advance(
                    ctx,
                    signal,
                    ProcessingStatus::TranslationFailed,
                    Some(INTERRUPTED),
                )
                .await?
            }
            _ => {}
        }

        if ctx.status == ProcessingStatus::Pending {
            self.advance(ctx, signal, ProcessingStatus::Queued, None).await?;
        }

        let _permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|e| OrchestratorError::TaskFailed(e.to_string()))?
            }
            _ = signal.notify.notified() => return Err(Interrupt::Cancelled),
        };
        check_cancelled(signal)?;

        if matches!(
            ctx.status,
            ProcessingStatus::Queued | ProcessingStatus::OcrFailed
        ) {
            let text = match self.ocr_stage(ctx, signal, request).await? {
                StageEnd::Succeeded(text) => text,
                StageEnd::Stopped | StageEnd::Errored => return Ok(()),
            };
            self.documents.save_ocr_text(&ctx.document_id, &text).await?;
            ctx.ocr_text = Some(text);
            self.advance(ctx, signal, ProcessingStatus::OcrComplete, None)
                .await?;
        }

        match (&request.translation, ctx.status) {
            (_, ProcessingStatus::TranslationComplete) => {}
            (None, ProcessingStatus::OcrComplete) => {}
            (Some(translation), ProcessingStatus::OcrComplete | ProcessingStatus::TranslationFailed) => {
                match self.translation_stage(ctx, signal, translation).await? {
                    StageEnd::Succeeded(_) => {}
                    StageEnd::Stopped | StageEnd::Errored => return Ok(()),
                }
            }
            (None, ProcessingStatus::TranslationFailed) => {
                // Parked translation but this request does not ask for one.
                return Ok(());
            }
            (_, status) => {
                return Err(OrchestratorError::IllegalTransition {
                    from: status,
                    to: ProcessingStatus::Complete,
                }
                .into())
            }
        }

        self.advance(ctx, signal, ProcessingStatus::Complete, None)
            .await?;
        info!("Run complete");
        Ok(())
    }

    async fn ocr_stage(
        &self,
        ctx: &mut RunContext,
        signal: &RunSignal,
        request: &RunRequest,
    ) -> Step<StageEnd> {
        let span = info_span!("stage", stage = Stage::Ocr.name());
        async {
            debug!(image_bytes = request.image.len(), "Starting OCR");
            self.advance(ctx, signal, ProcessingStatus::OcrInProgress, None)
                .await?;
            let call = StageCall::Ocr {
                image: &request.image,
            };
            self.attempt_loop(ctx, signal, call).await
        }
        .instrument(span)
        .await
    }

    async fn translation_stage(
        &self,
        ctx: &mut RunContext,
        signal: &RunSignal,
        translation: &TranslationRequest,
    ) -> Step<StageEnd> {
        let model_id = self.resolve_model(translation)?;
        let span = info_span!(
            "stage",
            stage = Stage::Translation.name(),
            source_lang = %translation.source_lang,
            target_lang = %translation.target_lang,
            model = %model_id,
        );

        async {
            let text = ctx.ocr_text.clone().ok_or_else(|| {
                OrchestratorError::MissingOcrText(ctx.document_id.clone())
            })?;

            self.advance(ctx, signal, ProcessingStatus::TranslationInProgress, None)
                .await?;

            if let Some(hit) = self
                .cache
                .lookup(
                    &text,
                    &translation.source_lang,
                    &translation.target_lang,
                    &model_id,
                )
                .await
            {
                debug!(key = %sanitize::short_key(&hit.key), "Translation cache hit");
                self.documents
                    .save_translation(&ctx.document_id, &hit.translated_text)
                    .await?;
                ctx.translated_text = Some(hit.translated_text.clone());
                ctx.from_cache = true;
                self.advance(
                    ctx,
                    signal,
                    ProcessingStatus::TranslationComplete,
                    Some(SERVED_FROM_CACHE),
                )
                .await?;
                return Ok(StageEnd::Succeeded(hit.translated_text));
            }

            let call = StageCall::Translate {
                text: &text,
                source_lang: &translation.source_lang,
                target_lang: &translation.target_lang,
                model_id: &model_id,
            };
            let end = self.attempt_loop(ctx, signal, call).await?;

            if let StageEnd::Succeeded(translated) = &end {
                self.cache
                    .store_translation(
                        &text,
                        &translation.source_lang,
                        &translation.target_lang,
                        &model_id,
                        translated,
                    )
                    .await;
                self.documents
                    .save_translation(&ctx.document_id, translated)
                    .await?;
                ctx.translated_text = Some(translated.clone());
                self.advance(ctx, signal, ProcessingStatus::TranslationComplete, None)
                    .await?;
            }
            Ok::<StageEnd, Interrupt>(end)
        }
        .instrument(span)
        .await
    }

    /// Calls the provider until success, a stopping failure, or the retry
    /// budget runs out. Expects the stage's in-progress state to be current.
    ///
    /// OCR success is left for the caller to record, since the OCR text has to
    /// be persisted before `OcrComplete`.
    async fn attempt_loop(
        &self,
        ctx: &mut RunContext,
        signal: &RunSignal,
        call: StageCall<'_>,
    ) -> Step<StageEnd> {
        let stage = call.stage();
        let max_retries = self.config.max_retries;
        let mut tried: HashSet<String> = HashSet::new();
        let mut retries = 0u32;

        loop {
            let outcome = self.executor.execute(call, &tried).await?;
            check_cancelled(signal)?;

            match outcome {
                StageOutcome::Succeeded { text, .. } => return Ok(StageEnd::Succeeded(text)),
                StageOutcome::Exhausted => {
                    self.advance(ctx, signal, stage.failed(), Some(CREDENTIALS_EXHAUSTED))
                        .await?;
                    return Ok(StageEnd::Stopped);
                }
                StageOutcome::Failed {
                    kind: FailureKind::InvalidCredential,
                    credential_id,
                    ..
                } => {
                    // Pool already deactivated it. Not charged to this document.
                    tried.insert(credential_id);
                }
                StageOutcome::Failed {
                    kind: FailureKind::Permanent,
                    reason,
                    ..
                } => {
                    self.advance(ctx, signal, stage.failed(), Some(&reason))
                        .await?;
                    return Ok(StageEnd::Stopped);
                }
                StageOutcome::Failed {
                    credential_id,
                    reason,
                    ..
                } => {
                    tried.insert(credential_id);

                    if retries >= max_retries {
                        let detail = format!("{}; gave up after {} attempts", reason, retries + 1);
                        self.advance(ctx, signal, stage.failed(), Some(&detail))
                            .await?;
                        self.advance(ctx, signal, ProcessingStatus::Error, Some(&detail))
                            .await?;
                        return Ok(StageEnd::Errored);
                    }

                    retries += 1;
                    let detail = format!("{}; retrying ({}/{})", reason, retries, max_retries);
                    self.advance(ctx, signal, stage.failed(), Some(&detail))
                        .await?;
                    self.advance(ctx, signal, stage.in_progress(), None).await?;
                }
            }
        }
    }

    /// Checks for cancellation, then persists and broadcasts `next`.
    async fn advance(
        &self,
        ctx: &mut RunContext,
        signal: &RunSignal,
        next: ProcessingStatus,
        detail: Option<&str>,
    ) -> Step<()> {
        check_cancelled(signal)?;
        self.persist_transition(ctx, next, detail).await?;
        Ok(())
    }

    async fn persist_transition(
        &self,
        ctx: &mut RunContext,
        next: ProcessingStatus,
        detail: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        if !ctx.status.can_transition_to(next) {
            return Err(OrchestratorError::IllegalTransition {
                from: ctx.status,
                to: next,
            });
        }

        self.documents
            .save_status(&ctx.document_id, next, detail)
            .await?;

        let from = ctx.status;
        ctx.status = next;
        ctx.detail = detail.map(str::to_string);
        self.broadcaster
            .send(StatusUpdate::new(&ctx.document_id, next, detail));

        match detail {
            Some(detail) => info!(%from, to = %next, detail, "Status changed"),
            None => info!(%from, to = %next, "Status changed"),
        }
        Ok(())
    }
}

fn check_cancelled(signal: &RunSignal) -> Step<()> {
    if signal.is_cancelled() {
        Err(Interrupt::Cancelled)
    } else {
        Ok(())
    }
}

fn not_found_or(error: StoreError, document_id: &str) -> OrchestratorError {
    match error {
        StoreError::DocumentNotFound(_) => {
            OrchestratorError::DocumentNotFound(document_id.to_string())
        }
        other => OrchestratorError::Persistence(other),
    }
}

struct ObserveState {
    document_id: String,
    rx: broadcast::Receiver<StatusUpdate>,
    /// Transitions persisted before this instant are already reflected in
    /// the first item.
    since: chrono::DateTime<chrono::Utc>,
    last: Option<ProcessingStatus>,
    pending: Option<StatusUpdate>,
    done: bool,
}

impl ObserveState {
    fn accepts(&self, update: &StatusUpdate) -> bool {
        update.document_id == self.document_id
            && update.timestamp >= self.since
            && self.last != Some(update.status)
    }

    fn emit(mut self, update: StatusUpdate) -> (StatusUpdate, Self) {
        self.last = Some(update.status);
        self.done = update.status.is_terminal();
        (update, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialEntry, CredentialPool, PoolPolicy};
    use crate::executor::{ApiError, ImageHandle, ProviderApi};
    use crate::store::{DocumentRecord, MemoryStore};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use secrecy::SecretString;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use ProcessingStatus::*;

    /// Replies from a script, then succeeds with the echoed input.
    #[derive(Default)]
    struct FakeApi {
        ocr: Mutex<Vec<Result<String, ApiError>>>,
        translate: Mutex<Vec<Result<String, ApiError>>>,
        ocr_calls: AtomicUsize,
        translate_calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeApi {
        fn scripted(
            mut ocr: Vec<Result<String, ApiError>>,
            mut translate: Vec<Result<String, ApiError>>,
        ) -> Self {
            ocr.reverse();
            translate.reverse();
            Self {
                ocr: Mutex::new(ocr),
                translate: Mutex::new(translate),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ProviderApi for FakeApi {
        async fn call_ocr(
            &self,
            image: &ImageHandle,
            _credential: &CredentialEntry,
        ) -> Result<String, ApiError> {
            self.ocr_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.ocr
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(format!("text of {}", image.id)))
        }

        async fn call_translate(
            &self,
            text: &str,
            _source_lang: &str,
            target_lang: &str,
            _model_id: &str,
            _credential: &CredentialEntry,
        ) -> Result<String, ApiError> {
            self.translate_calls.fetch_add(1, Ordering::SeqCst);
            self.translate
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(format!("[{}] {}", target_lang, text)))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<MemoryStore>,
        api: Arc<FakeApi>,
        pool: Arc<CredentialPool>,
    }

    fn harness(api: FakeApi, keys: usize) -> Harness {
        harness_with_runs(api, keys, 4)
    }

    fn harness_with_runs(api: FakeApi, keys: usize, max_concurrent_runs: usize) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let entries = (0..keys)
            .map(|i| CredentialEntry::new(format!("key-{}", i), SecretString::from("secret")))
            .collect();
        let pool = Arc::new(CredentialPool::with_entries(PoolPolicy::default(), entries));
        let api = Arc::new(api);
        let executor = Arc::new(StageExecutor::new(pool.clone(), api.clone()));
        let cache = Arc::new(TranslationCache::with_defaults(store.clone()));
        let orchestrator = Orchestrator::new(
            store.clone(),
            cache,
            executor,
            OrchestratorConfig {
                max_concurrent_runs,
                ..Default::default()
            },
        );
        Harness {
            orchestrator,
            store,
            api,
            pool,
        }
    }

    fn translate_request() -> RunRequest {
        RunRequest::with_translation(
            ImageHandle::new("scan", vec![1u8, 2, 3]),
            TranslationRequest::new("de", "en"),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<StatusUpdate>) -> Vec<ProcessingStatus> {
        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.status);
        }
        seen
    }

    #[tokio::test]
    async fn test_happy_path_sequence() {
        let h = harness(FakeApi::default(), 2);
        h.orchestrator.create_document("doc").await.unwrap();
        let mut rx = h.orchestrator.subscribe();

        let outcome = h.orchestrator.run("doc", translate_request()).await.unwrap();

        assert_eq!(outcome.status, Complete);
        assert_eq!(outcome.translated_text.as_deref(), Some("[en] text of scan"));
        assert!(!outcome.from_cache);
        assert_eq!(
            drain(&mut rx),
            vec![
                Queued,
                OcrInProgress,
                OcrComplete,
                TranslationInProgress,
                TranslationComplete,
                Complete
            ]
        );
        assert_eq!(h.store.load_status("doc").await.unwrap(), Complete);
        assert_eq!(h.store.cache_len(), 1);
    }

    #[tokio::test]
    async fn test_ocr_only_goes_straight_to_complete() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator.create_document("doc").await.unwrap();
        let mut rx = h.orchestrator.subscribe();

        let outcome = h
            .orchestrator
            .run("doc", RunRequest::ocr_only(ImageHandle::new("scan", vec![0u8])))
            .await
            .unwrap();

        assert_eq!(outcome.status, Complete);
        assert_eq!(drain(&mut rx), vec![Queued, OcrInProgress, OcrComplete, Complete]);
        assert_eq!(h.api.translate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_translate_call() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator
            .cache()
            .store_translation("text of scan", "de", "en", "standard", "cached!")
            .await;
        h.orchestrator.create_document("doc").await.unwrap();
        let mut rx = h.orchestrator.subscribe();

        let outcome = h.orchestrator.run("doc", translate_request()).await.unwrap();

        assert!(outcome.from_cache);
        assert_eq!(outcome.translated_text.as_deref(), Some("cached!"));
        assert_eq!(h.api.translate_calls.load(Ordering::SeqCst), 0);
        let seen = drain(&mut rx);
        let pos = seen.iter().position(|s| *s == TranslationInProgress).unwrap();
        assert_eq!(seen[pos + 1], TranslationComplete);
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_retry() {
        let api = FakeApi::scripted(vec![], vec![Err(ApiError::Permanent("bad input".into()))]);
        let h = harness(api, 2);
        h.orchestrator.create_document("doc").await.unwrap();

        let outcome = h.orchestrator.run("doc", translate_request()).await.unwrap();

        assert_eq!(outcome.status, TranslationFailed);
        assert_eq!(outcome.detail.as_deref(), Some("request rejected by provider"));
        assert_eq!(h.api.translate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_ends_in_error() {
        let api = FakeApi::scripted(
            (0..10)
                .map(|_| Err(ApiError::Transient("503".into())))
                .collect(),
            vec![],
        );
        let h = harness(api, 5);
        h.orchestrator.create_document("doc").await.unwrap();
        let mut rx = h.orchestrator.subscribe();

        let outcome = h.orchestrator.run("doc", translate_request()).await.unwrap();

        assert_eq!(outcome.status, Error);
        assert_eq!(h.api.ocr_calls.load(Ordering::SeqCst), 4);
        let seen = drain(&mut rx);
        assert_eq!(seen.iter().filter(|s| **s == OcrFailed).count(), 4);
        assert_eq!(seen.last(), Some(&Error));
        assert!(!outcome.detail.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_invalid_credential_reselects_without_budget() {
        let api = FakeApi::scripted(
            vec![
                Err(ApiError::InvalidCredential("revoked".into())),
                Err(ApiError::InvalidCredential("revoked".into())),
            ],
            vec![],
        );
        let h = harness(api, 3);
        h.orchestrator.create_document("doc").await.unwrap();
        let mut rx = h.orchestrator.subscribe();

        let outcome = h
            .orchestrator
            .run("doc", RunRequest::ocr_only(ImageHandle::new("scan", vec![0u8])))
            .await
            .unwrap();

        assert_eq!(outcome.status, Complete);
        assert_eq!(drain(&mut rx), vec![Queued, OcrInProgress, OcrComplete, Complete]);
        assert_eq!(h.pool.stats().unwrap().active, 1);
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator.create_document("doc").await.unwrap();
        let request = RunRequest::with_translation(
            ImageHandle::new("scan", vec![0u8]),
            TranslationRequest::new("de", "en").with_model("imaginary"),
        );

        let err = h.orchestrator.run("doc", request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownModel(m) if m == "imaginary"));
        assert_eq!(h.store.load_status("doc").await.unwrap(), Pending);
    }

    #[tokio::test]
    async fn test_terminal_document_rejected() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator.create_document("doc").await.unwrap();
        h.orchestrator.run("doc", translate_request()).await.unwrap();

        let err = h.orchestrator.run("doc", translate_request()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::AlreadyTerminal {
                status: Complete,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_document() {
        let h = harness(FakeApi::default(), 1);
        let err = h.orchestrator.run("ghost", translate_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DocumentNotFound(_)));
        assert!(!h.orchestrator.is_running("ghost"));
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_active() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let h = harness(api, 1);
        h.orchestrator.create_document("doc").await.unwrap();

        let handle = h.orchestrator.start("doc", translate_request()).await.unwrap();
        let err = h.orchestrator.start("doc", translate_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRunning(_)));

        gate.notify_one();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.status, Complete);
        assert_eq!(h.api.ocr_calls.load(Ordering::SeqCst), 1);
        assert!(!h.orchestrator.is_running("doc"));
    }

    #[tokio::test]
    async fn test_cancel_active_run_after_call_returns() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let h = harness(api, 1);
        h.orchestrator.create_document("doc").await.unwrap();

        let handle = h.orchestrator.start("doc", translate_request()).await.unwrap();
        while h.api.ocr_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(h.orchestrator.cancel("doc").await.unwrap());
        gate.notify_one();

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.status, Cancelled);
        assert!(outcome.ocr_text.is_none());
        assert_eq!(h.store.load_status("doc").await.unwrap(), Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_run_waiting_for_permit() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let h = harness_with_runs(api, 1, 1);
        h.orchestrator.create_document("doc-a").await.unwrap();
        h.orchestrator.create_document("doc-b").await.unwrap();

        // doc-a holds the only permit while its OCR call is parked.
        let first = h.orchestrator.start("doc-a", translate_request()).await.unwrap();
        while h.api.ocr_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = h.orchestrator.start("doc-b", translate_request()).await.unwrap();
        while h.store.load_status("doc-b").await.unwrap() != Queued {
            tokio::task::yield_now().await;
        }
        assert!(h.orchestrator.is_running("doc-b"));

        assert!(h.orchestrator.cancel("doc-b").await.unwrap());
        let outcome = second.join().await.unwrap();
        assert_eq!(outcome.status, Cancelled);
        assert!(outcome.ocr_text.is_none());
        assert_eq!(h.store.load_status("doc-b").await.unwrap(), Cancelled);
        assert!(!h.orchestrator.is_running("doc-b"));
        assert_eq!(h.api.ocr_calls.load(Ordering::SeqCst), 1);

        gate.notify_one();
        let outcome = first.join().await.unwrap();
        assert_eq!(outcome.status, Complete);
        assert_eq!(h.api.ocr_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_idle_document() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator.create_document("doc").await.unwrap();

        assert!(h.orchestrator.cancel("doc").await.unwrap());
        assert_eq!(h.store.load_status("doc").await.unwrap(), Cancelled);
        assert!(!h.orchestrator.cancel("doc").await.unwrap());
        assert!(matches!(
            h.orchestrator.cancel("ghost").await,
            Err(OrchestratorError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_interrupted_ocr() {
        let h = harness(FakeApi::default(), 1);
        h.store.create_document("doc").await.unwrap();
        h.store.save_status("doc", OcrInProgress, None).await.unwrap();
        let mut rx = h.orchestrator.subscribe();

        let outcome = h
            .orchestrator
            .run("doc", RunRequest::ocr_only(ImageHandle::new("scan", vec![0u8])))
            .await
            .unwrap();

        assert_eq!(outcome.status, Complete);
        assert_eq!(
            drain(&mut rx),
            vec![OcrFailed, OcrInProgress, OcrComplete, Complete]
        );
    }

    #[tokio::test]
    async fn test_resume_failed_translation_reuses_ocr_text() {
        let h = harness(FakeApi::default(), 1);
        h.store.create_document("doc").await.unwrap();
        h.store.save_ocr_text("doc", "stored text").await.unwrap();
        h.store
            .save_status("doc", TranslationFailed, Some("rate limited by provider"))
            .await
            .unwrap();

        let outcome = h.orchestrator.run("doc", translate_request()).await.unwrap();

        assert_eq!(outcome.status, Complete);
        assert_eq!(outcome.translated_text.as_deref(), Some("[en] stored text"));
        assert_eq!(h.api.ocr_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resume_without_ocr_text_rejected() {
        let h = harness(FakeApi::default(), 1);
        h.store.create_document("doc").await.unwrap();
        h.store.save_status("doc", OcrComplete, None).await.unwrap();

        let err = h.orchestrator.run("doc", translate_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingOcrText(_)));
    }

    #[tokio::test]
    async fn test_observe_ends_after_terminal() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator.create_document("doc").await.unwrap();

        let observed = h.orchestrator.observe("doc").await.unwrap();
        let collector = tokio::spawn(async move {
            observed.map(|u| u.status).collect::<Vec<_>>().await
        });
        h.orchestrator.run("doc", translate_request()).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), collector)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            seen,
            vec![
                Pending,
                Queued,
                OcrInProgress,
                OcrComplete,
                TranslationInProgress,
                TranslationComplete,
                Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_observe_terminal_document_yields_one_item() {
        let h = harness(FakeApi::default(), 1);
        h.orchestrator.create_document("doc").await.unwrap();
        h.orchestrator.cancel("doc").await.unwrap();

        let seen: Vec<_> = h.orchestrator.observe("doc").await.unwrap().collect().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].status, Cancelled);
    }

    struct FailingStatusWrites(MemoryStore);

    #[async_trait]
    impl DocumentStore for FailingStatusWrites {
        async fn create_document(&self, id: &str) -> Result<DocumentRecord, StoreError> {
            self.0.create_document(id).await
        }

        async fn load_document(&self, id: &str) -> Result<Option<DocumentRecord>, StoreError> {
            self.0.load_document(id).await
        }

        async fn save_status(
            &self,
            _id: &str,
            _status: ProcessingStatus,
            _detail: Option<&str>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only filesystem".into()))
        }

        async fn save_ocr_text(&self, id: &str, text: &str) -> Result<(), StoreError> {
            self.0.save_ocr_text(id, text).await
        }

        async fn save_translation(&self, id: &str, text: &str) -> Result<(), StoreError> {
            self.0.save_translation(id, text).await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let documents = Arc::new(FailingStatusWrites(MemoryStore::new()));
        documents.create_document("doc").await.unwrap();
        let pool = Arc::new(CredentialPool::with_entries(
            PoolPolicy::default(),
            vec![CredentialEntry::new("k", SecretString::from("s"))],
        ));
        let api = Arc::new(FakeApi::default());
        let orchestrator = Orchestrator::new(
            documents,
            Arc::new(TranslationCache::with_defaults(Arc::new(MemoryStore::new()))),
            Arc::new(StageExecutor::new(pool, api.clone())),
            OrchestratorConfig::default(),
        );

        let err = orchestrator.run("doc", translate_request()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Persistence(_)));
        assert_eq!(api.ocr_calls.load(Ordering::SeqCst), 0);
        assert!(!orchestrator.is_running("doc"));
    }
}
