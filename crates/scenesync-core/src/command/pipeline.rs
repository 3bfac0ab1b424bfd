//! Single and batched command execution.
//!
//! # Flow (single command)
//!
//! 1. Compare the caller's base revision with the current one.
//! 2. Parse the command body and check names, class name and values.
//!    Malformed input never reaches locking.
//! 3. Acquire the command's lock paths under the request's owner.
//! 4. Apply the mutation.
//! 5. Release the owner's leases.
//! 6. Map the outcome to a status.
//!
//! Idempotency sits outside the pipeline (see `Engine`).

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::{
    conflict::{Conflict, ConflictReason, STATUS_OK},
    executor,
    response::{BatchItem, BatchResponse, CommandOutput, CommandResponse},
    types::{expected_ref_from_raw, BatchMode, BatchRequest, Command, CommandRequest},
};
use crate::{coordination::LockManager, domain::LockOwner, tree::TreeStore};

/// Borrowed view over the state one request needs.
///
/// The caller holds whatever guards protect `tree` and `locks` for the
/// lifetime of the pipeline, so one request runs to completion before the
/// next is observable.
pub struct CommandPipeline<'a> {
    tree: &'a mut TreeStore,
    locks: &'a mut LockManager,
    now: DateTime<Utc>,
}

impl<'a> CommandPipeline<'a> {
    pub fn new(tree: &'a mut TreeStore, locks: &'a mut LockManager, now: DateTime<Utc>) -> Self {
        Self { tree, locks, now }
    }

    fn check_revision(&self, base_revision: Option<u64>) -> Option<Conflict> {
        let current = self.tree.revision();
        base_revision
            .filter(|base| *base != current)
            .map(|base| Conflict::revision_mismatch(base, current))
    }

    /// Parse, lock, and apply one raw command under `owner`.
    ///
    /// Leases are left in place; the caller decides when the owner releases.
    fn run(&mut self, raw: &Value, owner: &LockOwner) -> Result<CommandOutput, Conflict> {
        let revision = self.tree.revision();
        let command: Command = serde_json::from_value(raw.clone()).map_err(|err| {
            Conflict::validation(
                expected_ref_from_raw(raw),
                format!("malformed command: {err}"),
                revision,
            )
        })?;

        let expected = command.expected_ref();
        command
            .validate_shape()
            .map_err(|err| Conflict::from_tree_error(expected.clone(), &err, revision))?;
        let paths = executor::lock_paths(self.tree, &command)?;
        self.locks
            .acquire(owner, &paths, self.now)
            .map_err(|lock| Conflict::locked(expected, &lock, revision))?;

        executor::execute(self.tree, command)
    }

    /// Execute one command request.
    pub fn execute(&mut self, request: &CommandRequest, owner: &LockOwner) -> CommandResponse {
        if let Some(conflict) = self.check_revision(request.base_revision) {
            debug!(%owner, "Rejected stale command");
            return CommandResponse::from_outcome(Err(conflict), self.tree.revision());
        }

        let outcome = self.run(&request.command, owner);
        self.locks.release(owner);
        CommandResponse::from_outcome(outcome, self.tree.revision())
    }

    /// Execute a batch.
    ///
    /// `next_owner` is called once for a transactional batch and once per
    /// command otherwise.
    pub fn execute_batch(
        &mut self,
        request: &BatchRequest,
        mut next_owner: impl FnMut() -> LockOwner,
    ) -> BatchResponse {
        let mode = request.mode();
        let transactional = mode == BatchMode::Transactional;
        let total = request.commands.len();

        if let Some(conflict) = self.check_revision(request.base_revision) {
            return BatchResponse::rejected(conflict, transactional, total, self.tree.revision());
        }

        let response = match mode {
            BatchMode::Transactional => self.run_transactional(&request.commands, &next_owner()),
            BatchMode::ContinueOnError => self.run_sequential(&request.commands, true, next_owner),
            BatchMode::StopOnError => self.run_sequential(&request.commands, false, next_owner),
        };

        info!(
            total,
            succeeded = response.success_count,
            failed = response.failure_count,
            status = response.status,
            transactional,
            rolled_back = response.rolled_back,
            "Batch finished"
        );
        response
    }

    fn run_transactional(&mut self, commands: &[Value], owner: &LockOwner) -> BatchResponse {
        let snapshot = self.tree.create_snapshot();
        let mut results = Vec::with_capacity(commands.len());
        let mut failure = None;

        for (index, raw) in commands.iter().enumerate() {
            let outcome = self.run(raw, owner);
            let reason = outcome.as_ref().err().map(|conflict| conflict.reason);
            results.push(BatchItem::from_outcome(index, outcome));
            if reason.is_some() {
                failure = reason;
                break;
            }
        }

        if failure.is_some() {
            self.tree.restore_snapshot(&snapshot);
        }
        self.locks.release(owner);

        let status = match failure {
            None => STATUS_OK,
            Some(ConflictReason::Locked) => ConflictReason::Locked.status(),
            Some(_) => ConflictReason::RevisionMismatch.status(),
        };
        finish(results, commands.len(), status, true, failure.is_some(), self.tree.revision())
    }

    fn run_sequential(
        &mut self,
        commands: &[Value],
        continue_on_error: bool,
        mut next_owner: impl FnMut() -> LockOwner,
    ) -> BatchResponse {
        let mut results = Vec::with_capacity(commands.len());

        for (index, raw) in commands.iter().enumerate() {
            let owner = next_owner();
            let outcome = self.run(raw, &owner);
            self.locks.release(&owner);
            let failed = outcome.is_err();
            results.push(BatchItem::from_outcome(index, outcome));
            if failed && !continue_on_error {
                break;
            }
        }

        let status = results
            .iter()
            .filter_map(|item| item.conflict.as_ref().map(|conflict| conflict.reason))
            .max_by_key(|reason| reason.severity())
            .map_or(STATUS_OK, ConflictReason::status);
        finish(results, commands.len(), status, false, false, self.tree.revision())
    }
}

fn finish(
    results: Vec<BatchItem>,
    total: usize,
    status: u16,
    transactional: bool,
    rolled_back: bool,
    revision: u64,
) -> BatchResponse {
    let success_count = results.iter().filter(|item| item.success).count();
    let failure_count = results.len() - success_count;
    BatchResponse {
        success: failure_count == 0,
        status,
        transactional,
        total,
        success_count,
        failure_count,
        rolled_back,
        results,
        revision,
        conflict: None,
    }
}
