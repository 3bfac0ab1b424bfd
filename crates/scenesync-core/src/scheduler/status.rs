//! Test Run Status State Machine (Pure Domain Logic)
//!
//! # State Machine
//!
//! ```text
//! queued -> dispatching -> running -> passed
//!    |          |            |
//!    v          v            v
//! aborted    failed/aborted/passed
//!
//! dispatching|running|failed -> queued (retry)
//! ```
//!
//! Terminal states: `passed`, `failed`, `aborted`. The `failed -> queued`
//! retry edge is the only way out of a terminal state.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STATE MACHINE ERROR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error type for invalid run state transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid state transition: cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RUN STATUS STATE MACHINE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifecycle of a scripted test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting in the FIFO, possibly delayed by a retry backoff.
    Queued,
    /// Claimed for dispatch; the executor has not started yet.
    Dispatching,
    /// The executor is running the scenario.
    Running,
    Passed,
    Failed,
    /// Cancelled before dispatch, or stopped by the executor.
    Aborted,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Dispatching => "dispatching",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Aborted)
    }

    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        self.validate_transition(target).is_ok()
    }

    /// Validates that a transition from `self` to `target` is allowed.
    pub fn validate_transition(&self, target: Self) -> std::result::Result<(), TransitionError> {
        let is_valid = match self {
            Self::Queued => matches!(target, Self::Dispatching | Self::Aborted),
            Self::Dispatching => matches!(
                target,
                Self::Running | Self::Queued | Self::Passed | Self::Failed | Self::Aborted
            ),
            Self::Running => matches!(
                target,
                Self::Queued | Self::Passed | Self::Failed | Self::Aborted
            ),
            Self::Failed => matches!(target, Self::Queued),
            Self::Passed | Self::Aborted => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError {
                from: *self,
                to: target,
            })
        }
    }

    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Queued,
            Self::Dispatching,
            Self::Running,
            Self::Passed,
            Self::Failed,
            Self::Aborted,
        ]
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| Error::validation_error(format!("Invalid run status: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Dispatching));
        assert!(RunStatus::Dispatching.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Passed));
    }

    #[test]
    fn test_terminal_states_have_no_exits_except_retry() {
        for target in RunStatus::all() {
            assert!(!RunStatus::Passed.can_transition_to(*target));
            assert!(!RunStatus::Aborted.can_transition_to(*target));
        }
        assert!(RunStatus::Failed.can_transition_to(RunStatus::Queued));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Passed));
    }

    #[test]
    fn test_queued_cannot_skip_dispatch() {
        let err = RunStatus::Queued.validate_transition(RunStatus::Running);
        assert_eq!(
            err.map_err(|e| e.to_string()),
            Err("invalid state transition: cannot transition from queued to running".to_string())
        );
    }

    #[test]
    fn test_round_trip_names() -> Result<()> {
        for status in RunStatus::all() {
            assert_eq!(status.as_str().parse::<RunStatus>()?, *status);
        }
        assert!("merged".parse::<RunStatus>().is_err());
        Ok(())
    }
}
