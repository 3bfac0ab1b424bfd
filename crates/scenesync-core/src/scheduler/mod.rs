//! Test run scheduling: a FIFO of scripted scenario executions with a
//! per-run state machine and retry backoff.

pub mod dispatch;
pub mod error;
pub mod queue;
pub mod run;
pub mod status;

pub use dispatch::{ExecutionOutcome, ScenarioExecutor};
pub use error::SchedulerError;
pub use queue::{SchedulerStats, TestRunScheduler, DEFAULT_HISTORY_LIMIT};
pub use run::{RunRequest, SafetyPolicy, TestRun};
pub use status::{RunStatus, TransitionError};
