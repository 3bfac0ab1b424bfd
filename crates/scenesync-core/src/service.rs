//! Async facade over the core components.
//!
//! Each component sits behind its own `tokio::sync::Mutex`. Tree mutations
//! are serialized through the tree guard; lock leases, the idempotency cache
//! and the run queue are guarded independently. Code that needs more than
//! one guard takes them in this order:
//!
//! 1. idempotency
//! 2. tree
//! 3. locks
//!
//! The scheduler guard is never held together with the others, and never
//! across an executor await.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::{
    command::{
        BatchRequest, BatchResponse, CommandPipeline, CommandRequest, CommandResponse, Conflict,
        Response,
    },
    config::Config,
    coordination::{IdempotencyCache, LockConflict, LockLease, LockManager, LockStats},
    domain::{InstancePath, LockOwner, RunId},
    read_model::{build_schema, build_snapshot, SchemaView, SnapshotView},
    scheduler::{
        ExecutionOutcome, RunRequest, RunStatus, SafetyPolicy, ScenarioExecutor, SchedulerError,
        SchedulerStats, TestRun, TestRunScheduler,
    },
    tree::{
        ChangeEvent, ChangeMessage, ChangeOrigin, ChangeOutcome, PendingChange, ResyncRecord,
        ResyncReport, TreeError, TreeStore,
    },
};

/// Idempotency namespace of single commands.
pub const COMMAND_ROUTE: &str = "command";
/// Idempotency namespace of batches.
pub const COMMANDS_ROUTE: &str = "commands";

// ═══════════════════════════════════════════════════════════════════════════
// CLOCK
// ═══════════════════════════════════════════════════════════════════════════

/// Wall-clock source for TTLs, timestamps and retry delays.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VIEWS
// ═══════════════════════════════════════════════════════════════════════════

/// Body of the lock diagnostics read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocksView {
    pub locks: Vec<LockLease>,
    pub stats: LockStats,
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════

/// Shared handle; clones refer to the same state.
#[derive(Debug, Clone)]
pub struct Engine {
    tree: Arc<Mutex<TreeStore>>,
    locks: Arc<Mutex<LockManager>>,
    idempotency: Arc<Mutex<IdempotencyCache>>,
    scheduler: Arc<Mutex<TestRunScheduler>>,
    owners: Arc<AtomicU64>,
    events: broadcast::Sender<ChangeEvent>,
    clock: Arc<dyn Clock>,
    default_safety: SafetyPolicy,
}

impl Engine {
    #[must_use]
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(config.events.channel_capacity.max(1));
        Self {
            tree: Arc::new(Mutex::new(TreeStore::new())),
            locks: Arc::new(Mutex::new(LockManager::with_ttl(config.lock_ttl()))),
            idempotency: Arc::new(Mutex::new(IdempotencyCache::new(
                config.idempotency_ttl(),
                config.idempotency.capacity,
            ))),
            scheduler: Arc::new(Mutex::new(TestRunScheduler::with_history_limit(
                config.scheduler.history_limit,
            ))),
            owners: Arc::new(AtomicU64::new(0)),
            events,
            clock,
            default_safety: config.default_safety(),
        }
    }

    /// Engine on the system clock.
    #[must_use]
    pub fn with_config(config: &Config) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn next_owner(&self) -> LockOwner {
        LockOwner::for_request(self.owners.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn publish(&self, tree: &mut TreeStore) {
        for event in tree.take_events() {
            // Err only means nobody is subscribed.
            let _ = self.events.send(event);
        }
    }

    /// Receive every change event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    pub async fn revision(&self) -> u64 {
        self.tree.lock().await.revision()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Reads
    // ───────────────────────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> SnapshotView {
        let (indexed, revision) = {
            let tree = self.tree.lock().await;
            (tree.get_indexed_instances(), tree.revision())
        };
        build_snapshot(&indexed, revision, self.clock.now())
    }

    pub async fn schema(&self, class_filter: Option<&str>) -> SchemaView {
        let (indexed, revision) = {
            let tree = self.tree.lock().await;
            (tree.get_indexed_instances(), tree.revision())
        };
        build_schema(&indexed, class_filter, revision, self.clock.now())
    }

    pub async fn locks(&self) -> LocksView {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        LocksView {
            locks: locks.active_locks(now),
            stats: locks.stats(now),
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Commands
    // ───────────────────────────────────────────────────────────────────────

    /// Execute `{baseRevision?, command}`.
    ///
    /// With a key, a repeat request replays the first reply verbatim,
    /// failures included, until the entry expires.
    pub async fn command(&self, request: Value, idempotency_key: Option<&str>) -> Response {
        let now = self.clock.now();
        let key = scoped_key(COMMAND_ROUTE, idempotency_key);
        let mut cache = self.idempotency.lock().await;
        if let Some(cached) = cache.get(key.as_deref(), now) {
            debug!(key = ?key, status = cached.status, "Replayed cached command reply");
            return Response::new(cached.status, cached.body);
        }

        let response = {
            let mut tree = self.tree.lock().await;
            let response = match serde_json::from_value::<CommandRequest>(request) {
                Ok(request) => {
                    let owner = self.next_owner();
                    let mut locks = self.locks.lock().await;
                    CommandPipeline::new(&mut tree, &mut locks, now).execute(&request, &owner)
                }
                Err(err) => {
                    let revision = tree.revision();
                    CommandResponse::from_outcome(Err(malformed(&err, revision)), revision)
                }
            };
            self.publish(&mut tree);
            response.into_response()
        };

        cache.set(key.as_deref(), response.status, &response.body, now);
        response
    }

    /// Execute `{baseRevision?, transactional?, continueOnError?, commands}`.
    pub async fn commands(&self, request: Value, idempotency_key: Option<&str>) -> Response {
        let now = self.clock.now();
        let key = scoped_key(COMMANDS_ROUTE, idempotency_key);
        let mut cache = self.idempotency.lock().await;
        if let Some(cached) = cache.get(key.as_deref(), now) {
            debug!(key = ?key, status = cached.status, "Replayed cached batch reply");
            return Response::new(cached.status, cached.body);
        }

        let response = {
            let mut tree = self.tree.lock().await;
            let response = match serde_json::from_value::<BatchRequest>(request) {
                Ok(request) => {
                    let mut locks = self.locks.lock().await;
                    CommandPipeline::new(&mut tree, &mut locks, now)
                        .execute_batch(&request, || self.next_owner())
                }
                Err(err) => {
                    let revision = tree.revision();
                    BatchResponse::rejected(malformed(&err, revision), false, 0, revision)
                }
            };
            self.publish(&mut tree);
            response.into_response()
        };

        cache.set(key.as_deref(), response.status, &response.body, now);
        response
    }

    // ───────────────────────────────────────────────────────────────────────
    // Explicit leases
    // ───────────────────────────────────────────────────────────────────────

    /// Hold leases across several requests. They block other owners'
    /// commands until released or expired.
    pub async fn acquire_locks(
        &self,
        owner: &LockOwner,
        paths: &[InstancePath],
    ) -> Result<Vec<LockLease>, LockConflict> {
        let now = self.clock.now();
        self.locks.lock().await.acquire(owner, paths, now)
    }

    pub async fn release_locks(&self, owner: &LockOwner) -> usize {
        self.locks.lock().await.release(owner)
    }

    // ───────────────────────────────────────────────────────────────────────
    // Bridge
    // ───────────────────────────────────────────────────────────────────────

    /// Full resync from the engine bridge.
    pub async fn replace_all(&self, records: Vec<ResyncRecord>) -> ResyncReport {
        let mut tree = self.tree.lock().await;
        let report = tree.replace_all(records);
        self.publish(&mut tree);
        report
    }

    /// Apply one change message from a collaborator.
    pub async fn apply_change(
        &self,
        message: ChangeMessage,
        origin: ChangeOrigin,
    ) -> Result<ChangeOutcome, TreeError> {
        let mut tree = self.tree.lock().await;
        let outcome = tree.apply_change(message, origin);
        self.publish(&mut tree);
        outcome
    }

    /// Drain the changes the bridge still has to apply on its side.
    pub async fn take_pending_changes(&self) -> Vec<PendingChange> {
        self.tree.lock().await.take_pending_changes()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Test runs
    // ───────────────────────────────────────────────────────────────────────

    pub async fn enqueue_run(&self, request: RunRequest) -> TestRun {
        let safety = request.safety.unwrap_or(self.default_safety);
        let now = self.clock.now();
        self.scheduler
            .lock()
            .await
            .enqueue(request.scenario, safety, now)
    }

    pub async fn get_run(&self, id: &RunId) -> Option<TestRun> {
        self.scheduler.lock().await.get(id).cloned()
    }

    pub async fn peek_next_queued_run(&self) -> Option<TestRun> {
        let now = self.clock.now();
        self.scheduler
            .lock()
            .await
            .peek_next_queued_run(now)
            .cloned()
    }

    pub async fn mark_dispatching(&self, id: &RunId) -> Result<TestRun, SchedulerError> {
        let now = self.clock.now();
        self.scheduler.lock().await.mark_dispatching(id, now)
    }

    pub async fn mark_running(&self, id: &RunId) -> Result<TestRun, SchedulerError> {
        let now = self.clock.now();
        self.scheduler.lock().await.mark_running(id, now)
    }

    pub async fn complete_run(
        &self,
        id: &RunId,
        status: RunStatus,
        message: Option<String>,
        result: Option<Value>,
    ) -> Result<TestRun, SchedulerError> {
        let now = self.clock.now();
        self.scheduler
            .lock()
            .await
            .complete(id, status, message, result, now)
    }

    pub async fn queue_retry(
        &self,
        id: &RunId,
        reason: impl Into<String> + Send,
    ) -> Result<TestRun, SchedulerError> {
        let now = self.clock.now();
        self.scheduler.lock().await.queue_retry(id, reason, now)
    }

    pub async fn abort_queued(
        &self,
        id: &RunId,
        reason: impl Into<String> + Send,
    ) -> Result<TestRun, SchedulerError> {
        let now = self.clock.now();
        self.scheduler.lock().await.abort_queued(id, reason, now)
    }

    pub async fn list_runs(&self) -> Vec<TestRun> {
        self.scheduler.lock().await.list()
    }

    pub async fn run_stats(&self) -> SchedulerStats {
        let now = self.clock.now();
        self.scheduler.lock().await.stats(now)
    }

    /// Time until the earliest delayed retry becomes ready.
    pub async fn next_ready_in(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.scheduler.lock().await.next_ready_in(now)
    }

    /// Dispatch the next ready run through `executor` and record its outcome.
    ///
    /// Returns `Ok(None)` when nothing is ready or another run holds the
    /// active slot. A retryable failure re-queues the run while attempts
    /// remain; otherwise the run completes as failed.
    pub async fn dispatch_next(
        &self,
        executor: &dyn ScenarioExecutor,
    ) -> Result<Option<TestRun>, SchedulerError> {
        let run = {
            let mut scheduler = self.scheduler.lock().await;
            if let Some(active) = scheduler.active_run() {
                debug!(run = %active, "Active slot busy, skipping dispatch");
                return Ok(None);
            }
            let now = self.clock.now();
            let Some(id) = scheduler.peek_next_queued_run(now).map(|run| run.id.clone()) else {
                return Ok(None);
            };
            scheduler.mark_dispatching(&id, now)?;
            scheduler.mark_running(&id, self.clock.now())?
        };

        let outcome = executor.execute(&run).await;

        let mut scheduler = self.scheduler.lock().await;
        let now = self.clock.now();
        let finished = match outcome {
            ExecutionOutcome::Failed {
                message,
                retryable: true,
                ..
            } if run.can_retry() => scheduler.queue_retry(
                &run.id,
                message.unwrap_or_else(|| "retryable failure".to_string()),
                now,
            )?,
            ExecutionOutcome::Passed { message, result } => {
                scheduler.complete(&run.id, RunStatus::Passed, message, result, now)?
            }
            ExecutionOutcome::Failed {
                message, result, ..
            } => scheduler.complete(&run.id, RunStatus::Failed, message, result, now)?,
            ExecutionOutcome::Aborted { message } => {
                scheduler.complete(&run.id, RunStatus::Aborted, message, None, now)?
            }
        };
        Ok(Some(finished))
    }
}

fn scoped_key(route: &str, key: Option<&str>) -> Option<String> {
    key.filter(|key| !key.is_empty())
        .map(|key| format!("{route}:{key}"))
}

fn malformed(err: &serde_json::Error, revision: u64) -> Conflict {
    Conflict::validation(Value::Null, format!("malformed request: {err}"), revision)
}
