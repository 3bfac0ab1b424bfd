//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config_dir>/scenesync/config.toml`
//! 3. Project config: `.scenesync/config.toml`
//! 4. Environment variables: `SCENESYNC_*`
//! 5. CLI flags
//!
//! # Example Config
//!
//! ```toml
//! [locks]
//! ttl_ms = 15000
//!
//! [idempotency]
//! ttl_ms = 600000
//! capacity = 1024
//!
//! [scheduler.default_safety]
//! max_retries = 2
//! retry_delay_ms = 1000
//! backoff_factor = 2.0
//!
//! [log]
//! filter = "scenesync_core=debug"
//! ```

mod defaults;
mod load;
mod merge;
mod types;
mod validate;

#[cfg(test)]
mod tests_loading;
#[cfg(test)]
mod tests_validation;

pub use defaults::{DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_LOG_FILTER};
pub use load::{global_config_path, load_config, load_toml_file, project_config_path};
pub use types::{
    Config, EventsConfig, IdempotencyConfig, LocksConfig, LogConfig, SafetyConfig,
    SchedulerConfig,
};
