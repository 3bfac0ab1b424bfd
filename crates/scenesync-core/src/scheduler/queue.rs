//! FIFO test-run scheduler with delayed retries.
//!
//! Runs dispatch in arrival order, one at a time. A delayed retry keeps its
//! place at the tail but never blocks runs that are ready now: the dispatch
//! candidate is the earliest queued run whose delay has elapsed.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    error::SchedulerError,
    run::{SafetyPolicy, TestRun},
    status::RunStatus,
};
use crate::domain::RunId;

/// Finished runs kept for listing before the oldest are pruned.
pub const DEFAULT_HISTORY_LIMIT: usize = 1_000;

/// Per-status counts plus the active slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub total: usize,
    pub queued: usize,
    /// Queued runs still waiting out a retry delay.
    pub delayed: usize,
    pub dispatching: usize,
    pub running: usize,
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub active: Option<RunId>,
}

#[derive(Debug, Clone)]
pub struct TestRunScheduler {
    /// Live runs plus the most recent finished ones, in arrival order.
    runs: IndexMap<RunId, TestRun>,
    /// Queued run ids; retries re-enter at the tail.
    queue: VecDeque<RunId>,
    active: Option<RunId>,
    next_sequence: u64,
    history_limit: usize,
}

impl Default for TestRunScheduler {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl TestRunScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` terminal runs; queued and active runs never count.
    #[must_use]
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            runs: IndexMap::new(),
            queue: VecDeque::new(),
            active: None,
            next_sequence: 0,
            history_limit: limit,
        }
    }

    #[must_use]
    pub fn get(&self, id: &RunId) -> Option<&TestRun> {
        self.runs.get(id)
    }

    #[must_use]
    pub const fn active_run(&self) -> Option<&RunId> {
        self.active.as_ref()
    }

    fn run_mut(&mut self, id: &RunId) -> Result<&mut TestRun, SchedulerError> {
        self.runs
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownRun(id.clone()))
    }

    fn transition(
        run: &mut TestRun,
        to: RunStatus,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        run.status
            .validate_transition(to)
            .map_err(|source| SchedulerError::Transition {
                id: run.id.clone(),
                source,
            })?;
        run.status = to;
        run.updated_at = now;
        Ok(())
    }

    fn clear_active(&mut self, id: &RunId) {
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
    }

    /// Drop the oldest terminal runs beyond the history limit.
    fn prune_history(&mut self) {
        let finished: Vec<RunId> = self
            .runs
            .values()
            .filter(|run| run.status.is_terminal())
            .map(|run| run.id.clone())
            .collect();
        let excess = finished.len().saturating_sub(self.history_limit);
        if excess == 0 {
            return;
        }
        for id in &finished[..excess] {
            self.runs.shift_remove(id);
        }
        debug!(pruned = excess, kept = self.history_limit, "Pruned finished test runs");
    }

    /// Append a new run to the queue.
    pub fn enqueue(&mut self, scenario: Value, safety: SafetyPolicy, now: DateTime<Utc>) -> TestRun {
        self.next_sequence += 1;
        let id = RunId::from_sequence(self.next_sequence);
        let run = TestRun::new(id.clone(), scenario, safety, now);
        self.runs.insert(id.clone(), run.clone());
        self.queue.push_back(id.clone());
        debug!(run = %id, "Enqueued test run");
        run
    }

    /// Earliest queued run that is ready at `now`, skipping delayed retries.
    #[must_use]
    pub fn peek_next_queued_run(&self, now: DateTime<Utc>) -> Option<&TestRun> {
        self.queue
            .iter()
            .filter_map(|id| self.runs.get(id))
            .find(|run| run.is_ready(now))
    }

    /// Time until the next queued run becomes ready.
    ///
    /// Zero when one is ready now, `None` when nothing is queued.
    #[must_use]
    pub fn next_ready_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.queue
            .iter()
            .filter_map(|id| self.runs.get(id))
            .map(|run| {
                run.next_dispatch_at
                    .map_or_else(Duration::zero, |at| (at - now).max(Duration::zero()))
            })
            .min()
    }

    /// Claim a ready queued run for the single active slot.
    pub fn mark_dispatching(&mut self, id: &RunId, now: DateTime<Utc>) -> Result<TestRun, SchedulerError> {
        if let Some(active) = self.active.as_ref().filter(|active| *active != id) {
            return Err(SchedulerError::SlotBusy {
                active: active.clone(),
            });
        }

        let run = self.run_mut(id)?;
        if let Some(ready_at) = run.next_dispatch_at.filter(|at| *at > now) {
            return Err(SchedulerError::NotReady {
                id: id.clone(),
                ready_at,
            });
        }
        Self::transition(run, RunStatus::Dispatching, now)?;
        run.next_dispatch_at = None;
        let snapshot = run.clone();

        self.queue.retain(|queued| queued != id);
        self.active = Some(id.clone());
        debug!(run = %id, attempt = snapshot.attempt, "Dispatching test run");
        Ok(snapshot)
    }

    pub fn mark_running(&mut self, id: &RunId, now: DateTime<Utc>) -> Result<TestRun, SchedulerError> {
        let run = self.run_mut(id)?;
        Self::transition(run, RunStatus::Running, now)?;
        run.started_at = Some(now);
        Ok(run.clone())
    }

    /// Record a terminal outcome. A run reaches a terminal status once.
    pub fn complete(
        &mut self,
        id: &RunId,
        status: RunStatus,
        message: Option<String>,
        result: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<TestRun, SchedulerError> {
        if !status.is_terminal() {
            return Err(SchedulerError::NotTerminal(status));
        }
        let run = self.run_mut(id)?;
        Self::transition(run, status, now)?;
        run.finished_at = Some(now);
        run.message = message;
        run.result = result;
        let snapshot = run.clone();

        self.queue.retain(|queued| queued != id);
        self.clear_active(id);
        self.prune_history();
        info!(run = %id, %status, attempt = snapshot.attempt, "Test run finished");
        Ok(snapshot)
    }

    /// Re-queue a dispatched or failed run after a backoff delay.
    pub fn queue_retry(
        &mut self,
        id: &RunId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<TestRun, SchedulerError> {
        let run = self.run_mut(id)?;
        if !run.can_retry() {
            return Err(SchedulerError::RetriesExhausted {
                id: id.clone(),
                attempt: run.attempt,
                max_retries: run.safety.max_retries,
            });
        }
        Self::transition(run, RunStatus::Queued, now)?;

        let delay = run.safety.retry_delay(run.attempt);
        run.next_dispatch_at = Some(now + delay);
        run.attempt += 1;
        run.finished_at = None;
        run.message = Some(reason.into());
        let snapshot = run.clone();

        self.queue.push_back(id.clone());
        self.clear_active(id);
        warn!(
            run = %id,
            attempt = snapshot.attempt,
            delay_ms = delay.num_milliseconds(),
            "Test run queued for retry"
        );
        Ok(snapshot)
    }

    /// Abort a run that has not been dispatched yet.
    pub fn abort_queued(
        &mut self,
        id: &RunId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<TestRun, SchedulerError> {
        let run = self.run_mut(id)?;
        if run.status != RunStatus::Queued {
            return Err(SchedulerError::NotQueued {
                id: id.clone(),
                status: run.status,
            });
        }
        Self::transition(run, RunStatus::Aborted, now)?;
        run.next_dispatch_at = None;
        run.finished_at = Some(now);
        run.message = Some(reason.into());
        let snapshot = run.clone();

        self.queue.retain(|queued| queued != id);
        self.prune_history();
        info!(run = %id, "Aborted queued test run");
        Ok(snapshot)
    }

    /// Live and retained runs in arrival order.
    #[must_use]
    pub fn list(&self) -> Vec<TestRun> {
        self.runs.values().cloned().collect()
    }

    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> SchedulerStats {
        let mut stats = SchedulerStats {
            total: self.runs.len(),
            active: self.active.clone(),
            ..SchedulerStats::default()
        };
        for run in self.runs.values() {
            match run.status {
                RunStatus::Queued => {
                    stats.queued += 1;
                    if !run.is_ready(now) {
                        stats.delayed += 1;
                    }
                }
                RunStatus::Dispatching => stats.dispatching += 1,
                RunStatus::Running => stats.running += 1,
                RunStatus::Passed => stats.passed += 1,
                RunStatus::Failed => stats.failed += 1,
                RunStatus::Aborted => stats.aborted += 1,
            }
        }
        stats
    }
}
