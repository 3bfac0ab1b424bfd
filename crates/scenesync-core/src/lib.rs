//! # scenesync core
//!
//! Consistency and command-execution engine for a live scene graph.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! Host-facing failures are [`Error`] values. Rejected commands are not
//! errors: they are [`command::Conflict`] values carried inside responses,
//! with an HTTP-equivalent status.
//!
//! ## Layout
//!
//! - [`tree`]: the authoritative instance tree, names, resync, change events
//! - [`coordination`]: path lock leases and the idempotency cache
//! - [`command`]: single and batched command execution
//! - [`scheduler`]: test-run queue with retry backoff
//! - [`read_model`]: snapshot and schema views
//! - [`service`]: the async [`Engine`] facade tying them together

pub mod command;
pub mod config;
pub mod coordination;
pub mod domain;
mod error;
pub mod read_model;
pub mod scheduler;
pub mod service;
pub mod tree;

pub use command::{Conflict, ConflictReason, Response};
pub use config::{load_config, Config};
pub use coordination::{IdempotencyCache, LockManager};
pub use domain::{InstanceId, InstancePath, LockOwner, PropertyValue, RunId};
pub use error::{Error, Result};
pub use scheduler::{RunStatus, TestRun, TestRunScheduler};
pub use service::{Clock, Engine, ManualClock, SystemClock};
pub use tree::{ChangeEvent, ChangeMessage, ChangeOrigin, TreeError, TreeStore};
