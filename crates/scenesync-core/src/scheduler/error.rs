use chrono::{DateTime, Utc};
use thiserror::Error;

use super::status::{RunStatus, TransitionError};
use crate::domain::RunId;

/// Why a scheduler operation was refused.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchedulerError {
    #[error("run not found: {0}")]
    UnknownRun(RunId),

    #[error("run {id}: {source}")]
    Transition {
        id: RunId,
        #[source]
        source: TransitionError,
    },

    #[error("run {id} is not ready until {ready_at}")]
    NotReady { id: RunId, ready_at: DateTime<Utc> },

    #[error("run {active} already occupies the active slot")]
    SlotBusy { active: RunId },

    #[error("run {id} exhausted its retries ({attempt} of {max_retries})")]
    RetriesExhausted {
        id: RunId,
        attempt: u32,
        max_retries: u32,
    },

    #[error("{0} is not a terminal status")]
    NotTerminal(RunStatus),

    #[error("run {id} is {status}, only queued runs can be aborted")]
    NotQueued { id: RunId, status: RunStatus },
}

impl SchedulerError {
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownRun(_) => 3,
            Self::NotTerminal(_) => 1,
            _ => 4,
        }
    }
}
