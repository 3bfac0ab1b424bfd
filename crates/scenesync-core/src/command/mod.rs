//! Command pipeline: declarative mutations with revision checks, locking,
//! a conflict taxonomy, and transactional batches.

pub mod conflict;
pub mod executor;
pub mod pipeline;
pub mod response;
pub mod types;

pub use conflict::{Conflict, ConflictReason, STATUS_OK};
pub use pipeline::CommandPipeline;
pub use response::{BatchItem, BatchResponse, CommandOutput, CommandResponse, Response};
pub use types::{BatchMode, BatchRequest, Command, CommandRequest, Target};
