//! Scheduler (C9): owns the crawl lifecycle, the worker pool, and binds
//! every other component (frontier, policy gate, rate limiter, renderer,
//! extractors, writers, checkpointer, manifest builder) into one run.

pub mod events;

use crate::checkpoint::{CheckpointPolicy, Checkpointer, CrawlCheckpoint};
use crate::config::{self, Config};
use crate::extract::{ExtractionContext, ExtractorSet};
use crate::frontier::Frontier;
use crate::manifest::{self, BlobStorageStats, ManifestInputs};
use crate::model::{
    AssetRecord, AssetType, DiscoverySource, EdgeRecord, ErrorKind, ErrorPhase, ErrorRecord,
    EventRecord, PageRecord, UrlTask,
};
use crate::policy::PolicyGate;
use crate::ratelimit::RateLimiter;
use crate::render::{RenderOutput, RenderRequest, Renderer};
use crate::url::{extract_origin, normalize_url};
use crate::writer::{BlobStore, DatasetMeta, DatasetWriter};
use crate::AtlasError;
use dashmap::DashMap;
use events::EventSequencer;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex as AsyncMutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_millis(150);
const MAX_FETCH_ATTEMPTS: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 200;

/// The crawl's current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running,
    Paused,
    Cancelling,
    Cancelled,
    Finalizing,
    Finished,
}

/// Why the crawl stopped running workers, first-reason-wins. Drives the
/// final [`ExitStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    UserCancel,
    ErrorBudgetExceeded,
    RendererFatal,
    WriterFatal,
}

/// Process-style exit codes, per the invocation contract (6.4). Library
/// callers read this typed value directly; nothing here calls
/// `std::process::exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    ErrorBudgetOrCancelled,
    RendererFatal,
    WriterFatal,
    ValidationFailed,
    UnknownFatal,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::ErrorBudgetOrCancelled => 2,
            ExitStatus::RendererFatal => 3,
            ExitStatus::WriterFatal => 4,
            ExitStatus::ValidationFailed => 5,
            ExitStatus::UnknownFatal => 10,
        }
    }
}

/// The terminal result of one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub crawl_id: Uuid,
    pub exit_status: ExitStatus,
    pub archive_path: Option<PathBuf>,
    pub pages_crawled: u64,
    pub errors: u64,
}

/// A point-in-time snapshot for `Status`.
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    pub queued: usize,
    pub completed: u64,
    pub errors: u64,
    pub pages_per_second: f64,
    pub resident_memory_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct CrawlStatus {
    pub state: CrawlState,
    pub progress: CrawlProgress,
}

/// Everything one running crawl needs, shared across its worker tasks.
struct CrawlHandle {
    state: RwLock<CrawlState>,
    cancel: CancellationToken,
    paused: AtomicBool,
    pause_notify: Notify,
    events_tx: broadcast::Sender<EventRecord>,
    sequencer: EventSequencer,
    frontier: Arc<Frontier>,
    completed: AtomicU64,
    errors: AtomicU64,
    started_at: Instant,
    stop_reason: AsyncMutex<Option<StopReason>>,
    outcome: AsyncMutex<Option<CrawlOutcome>>,
    finished_notify: Notify,
}

impl CrawlHandle {
    async fn record_stop(&self, reason: StopReason) {
        let mut guard = self.stop_reason.lock().await;
        if guard.is_none() {
            *guard = Some(reason);
        }
        drop(guard);
        *self.state.write().await = CrawlState::Cancelling;
        self.cancel.cancel();
    }
}

/// The crawl engine's library entry point: `Start`/`Pause`/`Resume`/
/// `Cancel`/`Status`/`Subscribe`, per the invocation contract.
pub struct Scheduler {
    crawls: DashMap<Uuid, Arc<CrawlHandle>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            crawls: DashMap::new(),
        }
    }

    /// Loads the configuration at `config_path`, starts a crawl in the
    /// background, and returns its id immediately.
    pub async fn start(&self, config_path: &Path) -> Result<Uuid, AtlasError> {
        let (cfg, config_hash) = config::load_config_with_hash(config_path)?;
        // Constructing the renderer first surfaces an unsupported render
        // mode synchronously, before any background work begins.
        let renderer = crate::render::default_renderer_for(cfg.render.mode, &cfg.http.user_agent)?;

        let crawl_id = Uuid::now_v7();
        let (events_tx, _rx) = broadcast::channel(events::EVENT_CHANNEL_CAPACITY);

        let max_depth = if cfg.max_depth < 0 {
            None
        } else {
            Some(cfg.max_depth as u32)
        };
        let max_pages = if cfg.max_pages == 0 {
            None
        } else {
            Some(cfg.max_pages)
        };
        let frontier = Arc::new(Frontier::new(max_depth, max_pages));

        let handle = Arc::new(CrawlHandle {
            state: RwLock::new(CrawlState::Idle),
            cancel: CancellationToken::new(),
            paused: AtomicBool::new(false),
            pause_notify: Notify::new(),
            events_tx,
            sequencer: EventSequencer::new(),
            frontier: frontier.clone(),
            completed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Instant::now(),
            stop_reason: AsyncMutex::new(None),
            outcome: AsyncMutex::new(None),
            finished_notify: Notify::new(),
        });
        self.crawls.insert(crawl_id, handle.clone());

        let staging_dir = cfg
            .resume
            .staging_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.staging", cfg.out_atls)));
        let resumed = Checkpointer::new(&staging_dir).read()?;

        tokio::spawn(run_crawl(
            Arc::new(cfg),
            config_hash,
            crawl_id,
            handle,
            renderer.into(),
            frontier,
            staging_dir,
            resumed,
        ));

        Ok(crawl_id)
    }

    // `pause`/`resume` only hold a `CrawlHandle`, not the running crawl's
    // `DatasetWriters` — these two events are broadcast to live subscribers
    // only, not persisted into the events dataset.
    pub async fn pause(&self, crawl_id: Uuid) -> Result<(), AtlasError> {
        let handle = self.handle(crawl_id)?;
        handle.paused.store(true, Ordering::SeqCst);
        *handle.state.write().await = CrawlState::Paused;
        events::emit(
            &handle.events_tx,
            &handle.sequencer,
            crawl_id,
            None,
            "info",
            events::EVENT_CRAWL_PAUSED,
            serde_json::json!({}),
        );
        Ok(())
    }

    pub async fn resume(&self, crawl_id: Uuid) -> Result<(), AtlasError> {
        let handle = self.handle(crawl_id)?;
        handle.paused.store(false, Ordering::SeqCst);
        *handle.state.write().await = CrawlState::Running;
        handle.pause_notify.notify_waiters();
        events::emit(
            &handle.events_tx,
            &handle.sequencer,
            crawl_id,
            None,
            "info",
            events::EVENT_CRAWL_RESUMED,
            serde_json::json!({}),
        );
        Ok(())
    }

    /// Idempotent: cancelling an already-cancelling or finished crawl is a
    /// no-op rather than an error.
    pub async fn cancel(&self, crawl_id: Uuid) -> Result<(), AtlasError> {
        let handle = self.handle(crawl_id)?;
        handle.record_stop(StopReason::UserCancel).await;
        handle.paused.store(false, Ordering::SeqCst);
        handle.pause_notify.notify_waiters();
        Ok(())
    }

    pub async fn status(&self, crawl_id: Uuid) -> Result<CrawlStatus, AtlasError> {
        let handle = self.handle(crawl_id)?;
        let elapsed = handle.started_at.elapsed().as_secs_f64().max(0.001);
        let completed = handle.completed.load(Ordering::Relaxed);
        Ok(CrawlStatus {
            state: *handle.state.read().await,
            progress: CrawlProgress {
                queued: handle.frontier.size().await,
                completed,
                errors: handle.errors.load(Ordering::Relaxed),
                pages_per_second: completed as f64 / elapsed,
                resident_memory_bytes: resident_memory_bytes(),
            },
        })
    }

    /// Subscribes to every lifecycle/progress event for a crawl; the
    /// caller filters by `EventRecord::event_code`. Dropping the receiver
    /// is the unsubscribe.
    pub fn subscribe(&self, crawl_id: Uuid) -> Result<broadcast::Receiver<EventRecord>, AtlasError> {
        let handle = self.handle(crawl_id)?;
        Ok(handle.events_tx.subscribe())
    }

    /// Blocks until the crawl finalizes and returns its outcome. Not part
    /// of the invocation contract proper, but the natural way for a
    /// library caller (or a test) to wait for completion.
    pub async fn join(&self, crawl_id: Uuid) -> Result<CrawlOutcome, AtlasError> {
        let handle = self.handle(crawl_id)?;
        loop {
            if let Some(outcome) = handle.outcome.lock().await.clone() {
                return Ok(outcome);
            }
            handle.finished_notify.notified().await;
        }
    }

    fn handle(&self, crawl_id: Uuid) -> Result<Arc<CrawlHandle>, AtlasError> {
        self.crawls
            .get(&crawl_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| AtlasError::FatalUnknown(format!("unknown crawl id {}", crawl_id)))
    }
}

fn resident_memory_bytes() -> u64 {
    let mut sys = sysinfo::System::new();
    let pid = sysinfo::Pid::from_u32(std::process::id());
    sys.refresh_process(pid);
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}

/// Builds and broadcasts one event, the same as [`events::emit`], and also
/// writes it into the events dataset so the archive carries its own event
/// log rather than only handing it to live subscribers.
#[allow(clippy::too_many_arguments)]
async fn emit_event(
    writers: &DatasetWriters,
    tx: &broadcast::Sender<EventRecord>,
    sequencer: &EventSequencer,
    crawl_id: Uuid,
    page_id: Option<Uuid>,
    level: &str,
    event_code: &str,
    payload: serde_json::Value,
) {
    let record = events::emit(tx, sequencer, crawl_id, page_id, level, event_code, payload);
    if let Some(writer) = writers.events.lock().await.as_mut() {
        if let Err(e) = writer.write(record) {
            tracing::error!(error = %e, "failed to persist event record");
        }
    }
}

struct DatasetWriters {
    pages: AsyncMutex<Option<DatasetWriter<PageRecord>>>,
    edges: AsyncMutex<Option<DatasetWriter<EdgeRecord>>>,
    assets: AsyncMutex<Option<DatasetWriter<AssetRecord>>>,
    errors: AsyncMutex<Option<DatasetWriter<ErrorRecord>>>,
    events: AsyncMutex<Option<DatasetWriter<EventRecord>>>,
}

impl DatasetWriters {
    fn init(archive_root: &Path) -> Result<Self, AtlasError> {
        use crate::writer::schemas;
        Ok(Self {
            pages: AsyncMutex::new(Some(DatasetWriter::init(
                archive_root,
                "pages",
                schemas::pages_schema(),
            )?)),
            edges: AsyncMutex::new(Some(DatasetWriter::init(
                archive_root,
                "edges",
                schemas::edges_schema(),
            )?)),
            assets: AsyncMutex::new(Some(DatasetWriter::init(
                archive_root,
                "assets",
                schemas::assets_schema(),
            )?)),
            errors: AsyncMutex::new(Some(DatasetWriter::init(
                archive_root,
                "errors",
                schemas::errors_schema(),
            )?)),
            events: AsyncMutex::new(Some(DatasetWriter::init(
                archive_root,
                "events",
                schemas::events_schema(),
            )?)),
        })
    }

    async fn restore(&self, checkpoint: &CrawlCheckpoint) -> Result<(), AtlasError> {
        {
            let mut guard = self.pages.lock().await;
            let writer = guard.as_mut().expect("writer present before finalize");
            for record in &checkpoint.pages {
                writer.write(record.clone())?;
            }
        }
        {
            let mut guard = self.edges.lock().await;
            let writer = guard.as_mut().expect("writer present before finalize");
            for record in &checkpoint.edges {
                writer.write(record.clone())?;
            }
        }
        {
            let mut guard = self.assets.lock().await;
            let writer = guard.as_mut().expect("writer present before finalize");
            for record in &checkpoint.assets {
                writer.write(record.clone())?;
            }
        }
        {
            let mut guard = self.errors.lock().await;
            let writer = guard.as_mut().expect("writer present before finalize");
            for record in &checkpoint.errors {
                writer.write(record.clone())?;
            }
        }
        {
            let mut guard = self.events.lock().await;
            let writer = guard.as_mut().expect("writer present before finalize");
            for record in &checkpoint.events {
                writer.write(record.clone())?;
            }
        }
        Ok(())
    }

    async fn snapshot(&self, crawl_id: Uuid, frontier: &Frontier) -> CrawlCheckpoint {
        CrawlCheckpoint {
            crawl_id,
            frontier: frontier.snapshot().await,
            pages: self.pages.lock().await.as_ref().map(|w| w.snapshot_pending()).unwrap_or_default(),
            edges: self.edges.lock().await.as_ref().map(|w| w.snapshot_pending()).unwrap_or_default(),
            assets: self.assets.lock().await.as_ref().map(|w| w.snapshot_pending()).unwrap_or_default(),
            errors: self.errors.lock().await.as_ref().map(|w| w.snapshot_pending()).unwrap_or_default(),
            events: self.events.lock().await.as_ref().map(|w| w.snapshot_pending()).unwrap_or_default(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Finalizes every dataset, returning their metadata in manifest order.
    async fn finalize_all(&self) -> Result<Vec<DatasetMeta>, AtlasError> {
        let mut metas = Vec::new();
        if let Some(w) = self.pages.lock().await.take() {
            metas.push(w.finalize()?);
        }
        if let Some(w) = self.edges.lock().await.take() {
            metas.push(w.finalize()?);
        }
        if let Some(w) = self.assets.lock().await.take() {
            metas.push(w.finalize()?);
        }
        if let Some(w) = self.errors.lock().await.take() {
            metas.push(w.finalize()?);
        }
        if let Some(w) = self.events.lock().await.take() {
            metas.push(w.finalize()?);
        }
        Ok(metas)
    }
}

struct WorkerContext {
    crawl_id: Uuid,
    config: Arc<Config>,
    handle: Arc<CrawlHandle>,
    frontier: Arc<Frontier>,
    policy_gate: Arc<PolicyGate>,
    policy_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    renderer: Arc<dyn Renderer>,
    extractors: ExtractorSet,
    writers: Arc<DatasetWriters>,
    blob_store: AsyncMutex<BlobStore>,
    asset_types_seen: AsyncMutex<HashSet<AssetType>>,
    checkpointer: Checkpointer,
    checkpoint_policy: AsyncMutex<CheckpointPolicy>,
    /// Policy warnings accumulated for the manifest's free-form `notes`
    /// (robots overrides, homograph hosts), deduplicated at finalize.
    notes: AsyncMutex<Vec<String>>,
}

async fn run_crawl(
    config: Arc<Config>,
    config_hash: String,
    crawl_id: Uuid,
    handle: Arc<CrawlHandle>,
    renderer: Arc<dyn Renderer>,
    frontier: Arc<Frontier>,
    staging_dir: PathBuf,
    resumed: Option<CrawlCheckpoint>,
) -> CrawlOutcome {
    let outcome = match run_crawl_inner(
        config.clone(),
        config_hash,
        crawl_id,
        handle.clone(),
        renderer,
        frontier,
        staging_dir,
        resumed,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(%crawl_id, error = %e, "crawl failed fatally");
            let outcome = CrawlOutcome {
                crawl_id,
                exit_status: ExitStatus::UnknownFatal,
                archive_path: None,
                pages_crawled: handle.completed.load(Ordering::Relaxed),
                errors: handle.errors.load(Ordering::Relaxed),
            };
            // The archive was never finalized here, so there is no events
            // dataset left to write into; subscribers still see it on the
            // broadcast channel.
            events::emit(
                &handle.events_tx,
                &handle.sequencer,
                crawl_id,
                None,
                "error",
                events::EVENT_CRAWL_FINISHED,
                serde_json::json!({ "exit_code": outcome.exit_status.code(), "fatal": true }),
            );
            outcome
        }
    };

    *handle.state.write().await = CrawlState::Finished;
    *handle.outcome.lock().await = Some(outcome.clone());
    handle.finished_notify.notify_waiters();
    outcome
}

async fn run_crawl_inner(
    config: Arc<Config>,
    config_hash: String,
    crawl_id: Uuid,
    handle: Arc<CrawlHandle>,
    renderer: Arc<dyn Renderer>,
    frontier: Arc<Frontier>,
    staging_dir: PathBuf,
    resumed: Option<CrawlCheckpoint>,
) -> Result<CrawlOutcome, AtlasError> {
    std::fs::create_dir_all(&staging_dir)?;

    let policy_gate = Arc::new(PolicyGate::new(&config));
    let policy_client = reqwest::Client::builder()
        .user_agent(config.http.user_agent.clone())
        .build()?;
    let rate_limiter = Arc::new(RateLimiter::new(config.http.rps, config.http.per_host_rps));
    let writers = Arc::new(DatasetWriters::init(&staging_dir)?);
    let checkpointer = Checkpointer::new(&staging_dir);
    let checkpoint_policy = CheckpointPolicy::new(config.checkpoint.interval, config.checkpoint.every_seconds);

    if let Some(checkpoint) = resumed {
        frontier.restore(checkpoint.frontier.clone()).await;
        writers.restore(&checkpoint).await?;
    } else {
        for seed in &config.seeds {
            if let Ok(normalized) = normalize_url(seed) {
                frontier
                    .push(UrlTask::seed(seed.clone(), normalized.to_string()))
                    .await;
            }
        }
    }

    *handle.state.write().await = CrawlState::Running;
    emit_event(
        &writers,
        &handle.events_tx,
        &handle.sequencer,
        crawl_id,
        None,
        "info",
        events::EVENT_CRAWL_STARTED,
        serde_json::json!({ "seeds": config.seeds.len() }),
    )
    .await;

    let ctx = Arc::new(WorkerContext {
        crawl_id,
        config: config.clone(),
        handle: handle.clone(),
        frontier: frontier.clone(),
        policy_gate,
        policy_client,
        rate_limiter,
        renderer,
        extractors: ExtractorSet::default_html(),
        writers: writers.clone(),
        blob_store: AsyncMutex::new(BlobStore::new(&staging_dir)),
        asset_types_seen: AsyncMutex::new(HashSet::new()),
        checkpointer,
        checkpoint_policy: AsyncMutex::new(checkpoint_policy),
        notes: AsyncMutex::new(Vec::new()),
    });

    let stop_token = merge_tokens(handle.cancel.clone(), watch_for_natural_completion(frontier.clone(), handle.cancel.clone()));

    let heartbeat_handle = tokio::spawn(heartbeat_loop(ctx.clone(), stop_token.clone()));

    let mut workers = Vec::new();
    for _ in 0..config.render.concurrency.max(1) {
        let ctx = ctx.clone();
        let stop_token = stop_token.clone();
        workers.push(tokio::spawn(async move { worker_loop(ctx, stop_token).await }));
    }
    for w in workers {
        let _ = w.await;
    }
    stop_token.cancel();
    let _ = heartbeat_handle.await;

    *handle.state.write().await = CrawlState::Finalizing;

    let incomplete = handle.cancel.is_cancelled();
    let stop_reason = *handle.stop_reason.lock().await;

    let exit_status = match stop_reason {
        None => ExitStatus::Success,
        Some(StopReason::UserCancel) | Some(StopReason::ErrorBudgetExceeded) => {
            ExitStatus::ErrorBudgetOrCancelled
        }
        Some(StopReason::RendererFatal) => ExitStatus::RendererFatal,
        Some(StopReason::WriterFatal) => ExitStatus::WriterFatal,
    };
    // Recorded here, before finalize, so the events dataset itself carries
    // the crawl's own completion record rather than only the live broadcast.
    emit_event(
        &writers,
        &handle.events_tx,
        &handle.sequencer,
        crawl_id,
        None,
        "info",
        events::EVENT_CRAWL_FINISHED,
        serde_json::json!({ "exit_code": exit_status.code() }),
    )
    .await;

    let dataset_metas = writers.finalize_all().await?;
    let blob_count = ctx.blob_store.lock().await.blob_count();
    let merkle_root = ctx.blob_store.lock().await.merkle_root();
    let asset_types_present = ctx.asset_types_seen.lock().await.clone();

    let mut notes = ctx.notes.lock().await.clone();
    if incomplete {
        notes.push(format!("crawl stopped before natural completion: {:?}", stop_reason));
    }
    if config.robots.override_used {
        notes.push("robots.txt overrides were enabled for this crawl".to_string());
    }

    let (manifest_doc, provenance, summary) = manifest::assemble(ManifestInputs {
        crawl_id,
        config: &config,
        config_hash,
        datasets: dataset_metas,
        blob_storage: if blob_count > 0 {
            Some(BlobStorageStats {
                blob_count,
                merkle_root,
            })
        } else {
            None
        },
        incomplete,
        notes,
        asset_types_present,
        elapsed_seconds: handle.started_at.elapsed().as_secs_f64(),
    });

    manifest::write_artifacts(&staging_dir, &manifest_doc, &provenance, &summary)?;

    let archive_path = PathBuf::from(&config.out_atls);
    crate::archive::package(&staging_dir, &archive_path)?;

    Ok(CrawlOutcome {
        crawl_id,
        exit_status,
        archive_path: Some(archive_path),
        pages_crawled: handle.completed.load(Ordering::Relaxed),
        errors: handle.errors.load(Ordering::Relaxed),
    })
}

/// Links a user-cancellation token to a second, crawl-owned token that
/// fires on natural completion, so workers can select on a single token.
fn merge_tokens(user: CancellationToken, natural: CancellationToken) -> CancellationToken {
    let merged = CancellationToken::new();
    let merged_clone = merged.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = user.cancelled() => {}
            _ = natural.cancelled() => {}
        }
        merged_clone.cancel();
    });
    merged
}

/// Watches the frontier and fires its returned token once it is truly
/// empty (no pending tasks, nothing in flight).
fn watch_for_natural_completion(frontier: Arc<Frontier>, user_cancel: CancellationToken) -> CancellationToken {
    let done = CancellationToken::new();
    let done_clone = done.clone();
    tokio::spawn(async move {
        loop {
            if user_cancel.is_cancelled() {
                return;
            }
            if frontier.is_empty().await {
                done_clone.cancel();
                return;
            }
            tokio::time::sleep(COMPLETION_POLL_INTERVAL).await;
        }
    });
    done
}

async fn heartbeat_loop(ctx: Arc<WorkerContext>, stop_token: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {}
            _ = stop_token.cancelled() => return,
        }
        let elapsed = ctx.handle.started_at.elapsed().as_secs_f64().max(0.001);
        let completed = ctx.handle.completed.load(Ordering::Relaxed);
        emit_event(
            &ctx.writers,
            &ctx.handle.events_tx,
            &ctx.handle.sequencer,
            ctx.crawl_id,
            None,
            "info",
            events::EVENT_HEARTBEAT,
            serde_json::json!({
                "queued": ctx.frontier.size().await,
                "completed": completed,
                "errors": ctx.handle.errors.load(Ordering::Relaxed),
                "pages_per_second": completed as f64 / elapsed,
                "resident_memory_bytes": resident_memory_bytes(),
            }),
        )
        .await;
    }
}

async fn worker_loop(ctx: Arc<WorkerContext>, stop_token: CancellationToken) {
    loop {
        while ctx.handle.paused.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ctx.handle.pause_notify.notified() => {}
                _ = stop_token.cancelled() => return,
            }
        }

        let Some(task) = ctx.frontier.pop(&stop_token).await else {
            return;
        };

        process_task(&ctx, task, &stop_token).await;

        maybe_checkpoint(&ctx).await;
    }
}

async fn maybe_checkpoint(ctx: &WorkerContext) {
    if !ctx.config.checkpoint.enabled {
        return;
    }
    let due = {
        let mut policy = ctx.checkpoint_policy.lock().await;
        policy.record_page_completed();
        policy.is_due()
    };
    if !due {
        return;
    }
    let checkpoint = ctx.writers.snapshot(ctx.crawl_id, &ctx.frontier).await;
    match ctx.checkpointer.write(&checkpoint) {
        Ok(()) => {
            ctx.checkpoint_policy.lock().await.mark_checkpointed();
            emit_event(
                &ctx.writers,
                &ctx.handle.events_tx,
                &ctx.handle.sequencer,
                ctx.crawl_id,
                None,
                "info",
                events::EVENT_CHECKPOINT_WRITTEN,
                serde_json::json!({}),
            )
            .await;
        }
        Err(e) => {
            // Checkpoint I/O errors are logged and do not abort the crawl.
            emit_event(
                &ctx.writers,
                &ctx.handle.events_tx,
                &ctx.handle.sequencer,
                ctx.crawl_id,
                None,
                "warn",
                events::EVENT_CHECKPOINT_FAILED,
                serde_json::json!({ "message": e.to_string() }),
            )
            .await;
        }
    }
}

async fn process_task(ctx: &WorkerContext, task: UrlTask, stop_token: &CancellationToken) {
    let Ok(url) = url::Url::parse(&task.normalized_url) else {
        ctx.frontier.complete(&task.normalized_url).await;
        return;
    };

    let decision = ctx
        .policy_gate
        .evaluate(&ctx.policy_client, &ctx.config.http.user_agent, &url, task.depth)
        .await;

    let (robots_decision, warnings) = match decision {
        crate::policy::PolicyDecision::Deny { reason } => {
            emit_event(
                &ctx.writers,
                &ctx.handle.events_tx,
                &ctx.handle.sequencer,
                ctx.crawl_id,
                None,
                "info",
                events::EVENT_POLICY_DENIED,
                serde_json::json!({ "url": task.normalized_url, "reason": reason }),
            )
            .await;
            ctx.frontier.complete(&task.normalized_url).await;
            return;
        }
        crate::policy::PolicyDecision::Allow {
            robots_decision,
            warnings,
        } => (robots_decision, warnings),
    };
    if !warnings.is_empty() {
        let mut notes = ctx.notes.lock().await;
        for warning in &warnings {
            emit_event(
                &ctx.writers,
                &ctx.handle.events_tx,
                &ctx.handle.sequencer,
                ctx.crawl_id,
                None,
                "warn",
                "policy.warning",
                serde_json::json!({ "url": task.normalized_url, "message": warning }),
            )
            .await;
            let note = format!("{}: {}", task.normalized_url, warning);
            if !notes.contains(&note) {
                notes.push(note);
            }
        }
    }

    let Some(origin) = extract_origin(&url) else {
        ctx.frontier.complete(&task.normalized_url).await;
        return;
    };
    if !ctx.rate_limiter.acquire(&origin, stop_token).await {
        ctx.frontier.release_for_retry(&task.normalized_url).await;
        return;
    }

    let request = RenderRequest {
        url: url.clone(),
        wait_condition: crate::model::WaitCondition::Timeout,
        timeout: Duration::from_millis(ctx.config.render.timeout_ms),
        max_bytes: ctx.config.render.max_bytes_per_page,
        privacy: ctx.config.privacy.clone(),
        session_key: None,
    };

    match render_with_retries(ctx, &request, stop_token).await {
        Ok(render) => {
            complete_page(ctx, &task, robots_decision, render).await;
        }
        Err(error) => {
            record_error(ctx, &task.normalized_url, ErrorPhase::Fetch, &error).await;
            ctx.frontier.complete(&task.normalized_url).await;
        }
    }
}

async fn render_with_retries(
    ctx: &WorkerContext,
    request: &RenderRequest,
    stop_token: &CancellationToken,
) -> Result<RenderOutput, AtlasError> {
    let mut attempt = 0;
    loop {
        match ctx.renderer.render(request, stop_token).await {
            Ok(output) => return Ok(output),
            Err(e) if is_transient(&e) && attempt + 1 < MAX_FETCH_ATTEMPTS => {
                attempt += 1;
                let delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt - 1);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    _ = stop_token.cancelled() => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(error: &AtlasError) -> bool {
    matches!(error, AtlasError::FetchTimeout { .. } | AtlasError::FetchNetwork { .. })
}

async fn complete_page(
    ctx: &WorkerContext,
    task: &UrlTask,
    robots_decision: crate::model::RobotsDecision,
    render: RenderOutput,
) {
    let page_id = crate::model::new_page_id();
    let body_blob_ref = match ctx.blob_store.lock().await.put(&render.body) {
        Ok(path) => Some(path),
        Err(_) => None,
    };

    let extraction_ctx = ExtractionContext {
        task,
        page_id,
        render: &render,
        robots_decision,
        wait_condition: crate::model::WaitCondition::Timeout,
        captured_at: chrono::Utc::now(),
        previous_page_id: None,
    };
    let extraction = ctx.extractors.run(&extraction_ctx);

    if let Some(mut page) = extraction.page {
        page.body_blob_ref = body_blob_ref;
        if let Err(e) = ctx.writers.pages.lock().await.as_mut().unwrap().write(page) {
            handle_writer_error(ctx, &task.normalized_url, e).await;
        }
    }

    for edge in extraction.edges {
        let raw_target = edge.target_url.clone();
        let child_normalized = normalize_url(&raw_target).ok();
        let internal = edge.internal;
        if let Err(e) = ctx.writers.edges.lock().await.as_mut().unwrap().write(edge) {
            handle_writer_error(ctx, &task.normalized_url, e).await;
        }
        if let Some(normalized) = child_normalized {
            if internal || ctx.config.discovery.follow_external {
                let child = UrlTask::child(
                    raw_target,
                    normalized.to_string(),
                    task.depth + 1,
                    DiscoverySource::Link,
                    task.normalized_url.clone(),
                );
                ctx.frontier.push(child).await;
            }
        }
    }

    for asset in extraction.assets {
        ctx.asset_types_seen.lock().await.insert(asset.asset_type);
        if let Err(e) = ctx.writers.assets.lock().await.as_mut().unwrap().write(asset) {
            handle_writer_error(ctx, &task.normalized_url, e).await;
        }
    }

    ctx.frontier.complete(&task.normalized_url).await;
    ctx.handle.completed.fetch_add(1, Ordering::Relaxed);
    emit_event(
        &ctx.writers,
        &ctx.handle.events_tx,
        &ctx.handle.sequencer,
        ctx.crawl_id,
        Some(page_id),
        "info",
        events::EVENT_PAGE_COMPLETED,
        serde_json::json!({ "url": task.normalized_url }),
    )
    .await;
}

/// A schema violation is a per-record validation failure: it is recorded as
/// an error and the crawl continues. Every other writer error (I/O,
/// compression, serialization, or writing into an already-finalized
/// dataset) is unrecoverable for that dataset and escalates to a fatal stop.
async fn handle_writer_error(ctx: &WorkerContext, url: &str, error: crate::WriterError) {
    tracing::error!(%url, error = %error, "dataset writer error");
    let phase = if matches!(error, crate::WriterError::SchemaViolation { .. }) {
        ErrorPhase::Extract
    } else {
        ctx.handle.record_stop(StopReason::WriterFatal).await;
        ErrorPhase::Write
    };
    record_error(ctx, url, phase, &AtlasError::Writer(error)).await;
}

async fn record_error(ctx: &WorkerContext, url: &str, phase: ErrorPhase, error: &AtlasError) {
    let kind = classify_error(error);
    let record = ErrorRecord {
        url: url.to_string(),
        timestamp: chrono::Utc::now(),
        phase,
        kind,
        message: error.to_string(),
        retry_count: 0,
    };
    if kind.counts_against_budget() {
        let errors = ctx.handle.errors.fetch_add(1, Ordering::Relaxed) + 1;
        if ctx.config.max_errors >= 0 && errors > ctx.config.max_errors as u64 {
            emit_event(
                &ctx.writers,
                &ctx.handle.events_tx,
                &ctx.handle.sequencer,
                ctx.crawl_id,
                None,
                "error",
                events::EVENT_ERROR_BUDGET_EXCEEDED,
                serde_json::json!({ "errors": errors, "max_errors": ctx.config.max_errors }),
            )
            .await;
            ctx.handle.record_stop(StopReason::ErrorBudgetExceeded).await;
        }
    }
    emit_event(
        &ctx.writers,
        &ctx.handle.events_tx,
        &ctx.handle.sequencer,
        ctx.crawl_id,
        None,
        "error",
        events::EVENT_PAGE_ERROR,
        serde_json::json!({ "url": url, "kind": format!("{:?}", kind) }),
    )
    .await;
    if let Some(writer) = ctx.writers.errors.lock().await.as_mut() {
        if let Err(e) = writer.write(record) {
            tracing::error!(error = %e, "failed to write error record itself");
        }
    }
}

fn classify_error(error: &AtlasError) -> ErrorKind {
    match error {
        AtlasError::FetchTimeout { .. } => ErrorKind::FetchTimeout,
        AtlasError::FetchNetwork { .. } => ErrorKind::FetchNetwork,
        AtlasError::Http(_) => ErrorKind::FetchHttpError,
        AtlasError::RedirectLimit { .. } | AtlasError::RedirectLoop { .. } => ErrorKind::FetchNetwork,
        AtlasError::Render { .. } => ErrorKind::RenderCrash,
        AtlasError::Writer(crate::WriterError::SchemaViolation { .. }) => ErrorKind::SchemaViolation,
        AtlasError::Writer(_) => ErrorKind::WriteIo,
        AtlasError::Robots(_) => ErrorKind::RobotsFetch,
        AtlasError::Checkpoint(_) => ErrorKind::CheckpointIo,
        _ => ErrorKind::FatalUnknown,
    }
}
