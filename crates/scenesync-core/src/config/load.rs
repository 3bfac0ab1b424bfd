//! Configuration loading from files and environment (Immutable functional pattern)
//!
//! 1. Built-in defaults
//! 2. Global config: `<config_dir>/scenesync/config.toml`
//! 3. Project config: `.scenesync/config.toml` (or an explicit path)
//! 4. Environment variables: `SCENESYNC_*`

use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::Config;
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy.
///
/// `project_override` replaces the project config path (the CLI `--config`
/// flag); unlike the default path it must exist.
///
/// # Errors
///
/// Returns error if a config file is unreadable or malformed TOML, an
/// environment override does not parse, or the result fails validation.
pub fn load_config(project_override: Option<&Path>) -> Result<Config> {
    let config = Config::default();

    let config = match global_config_path() {
        Some(path) if path.is_file() => config.merge(load_toml_file(&path)?),
        _ => config,
    };

    let config = match project_override {
        Some(path) => config.merge(load_toml_file(path)?),
        None => {
            let path = project_config_path()?;
            if path.exists() {
                config.merge(load_toml_file(&path)?)
            } else {
                config
            }
        }
    };

    let config = config.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "scenesync")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
///
/// # Errors
///
/// Returns error if current directory cannot be determined
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".scenesync/config.toml"))
        .map_err(|e| Error::io_error(format!("Failed to get current directory: {e}")))
}

/// Load a TOML file into a partial Config
///
/// # Errors
///
/// Returns error if the path is a directory, cannot be read, or is not
/// valid TOML.
pub fn load_toml_file(path: &Path) -> Result<Config> {
    if path.is_dir() {
        return Err(Error::io_error(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::io_error(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), "Loaded config file");

    toml::from_str(&content).map_err(|e| {
        Error::parse_error(format!("Failed to parse config file {}: {e}", path.display()))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES (Immutable pattern)
// ═══════════════════════════════════════════════════════════════════════════

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("Invalid {name} value: {e}")))
}

impl Config {
    /// Apply `SCENESYNC_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if an environment variable value does not parse
    pub fn apply_env_vars(self) -> Result<Self> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (tests inject a map).
    ///
    /// # Errors
    ///
    /// Returns error if a value does not parse
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("SCENESYNC_LOCK_TTL_MS") {
            self.locks.ttl_ms = parse_env("SCENESYNC_LOCK_TTL_MS", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_IDEMPOTENCY_TTL_MS") {
            self.idempotency.ttl_ms = parse_env("SCENESYNC_IDEMPOTENCY_TTL_MS", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_IDEMPOTENCY_CAPACITY") {
            self.idempotency.capacity = parse_env("SCENESYNC_IDEMPOTENCY_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_HISTORY_LIMIT") {
            self.scheduler.history_limit = parse_env("SCENESYNC_HISTORY_LIMIT", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_TIMEOUT_MS") {
            self.scheduler.default_safety.timeout_ms = parse_env("SCENESYNC_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_MAX_RETRIES") {
            self.scheduler.default_safety.max_retries = parse_env("SCENESYNC_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_RETRY_DELAY_MS") {
            self.scheduler.default_safety.retry_delay_ms =
                parse_env("SCENESYNC_RETRY_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_BACKOFF_FACTOR") {
            self.scheduler.default_safety.backoff_factor =
                parse_env("SCENESYNC_BACKOFF_FACTOR", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_MAX_RETRY_DELAY_MS") {
            self.scheduler.default_safety.max_retry_delay_ms =
                parse_env("SCENESYNC_MAX_RETRY_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_EVENT_CAPACITY") {
            self.events.channel_capacity = parse_env("SCENESYNC_EVENT_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("SCENESYNC_LOG") {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(
                    "SCENESYNC_LOG cannot be empty - unset the variable or provide a filter",
                ));
            }
            self.log.filter = value;
        }
        Ok(self)
    }
}
