//! Seam to the external scenario execution backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{run::TestRun, status::RunStatus};

/// What the executor reports for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Passed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        result: Option<Value>,
    },
    Failed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        result: Option<Value>,
        /// Re-queue through the retry edge while attempts remain.
        #[serde(default)]
        retryable: bool,
    },
    Aborted {
        #[serde(default)]
        message: Option<String>,
    },
}

impl ExecutionOutcome {
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        match self {
            Self::Passed { .. } => RunStatus::Passed,
            Self::Failed { .. } => RunStatus::Failed,
            Self::Aborted { .. } => RunStatus::Aborted,
        }
    }
}

/// Runs one attempt of a scenario.
///
/// `run.safety.timeout_ms` is the executor's to honor; the scheduler hands
/// it over and does not enforce it.
#[async_trait]
pub trait ScenarioExecutor: Send + Sync {
    async fn execute(&self, run: &TestRun) -> ExecutionOutcome;
}
