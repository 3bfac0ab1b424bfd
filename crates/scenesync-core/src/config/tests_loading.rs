//! Loading-focused tests for configuration
//!
//! File parsing, layering, and environment overrides.

use std::{collections::HashMap, io::Write};

use super::{load_config, load_toml_file, Config};
use crate::{Error, Result};

fn write_temp(content: &str) -> Result<(tempfile::TempDir, std::path::PathBuf)> {
    let dir = tempfile::tempdir().map_err(|e| Error::io_error(format!("temp dir: {e}")))?;
    let path = dir.path().join("config.toml");
    let mut file =
        std::fs::File::create(&path).map_err(|e| Error::io_error(format!("create: {e}")))?;
    file.write_all(content.as_bytes())
        .map_err(|e| Error::io_error(format!("write: {e}")))?;
    Ok((dir, path))
}

#[test]
fn test_partial_file_keeps_defaults() -> Result<()> {
    let (_dir, path) = write_temp("[locks]\nttl_ms = 5000\n")?;

    let config = load_toml_file(&path)?;

    assert_eq!(config.locks.ttl_ms, 5000);
    assert_eq!(config.idempotency, Config::default().idempotency);
    Ok(())
}

#[test]
fn test_malformed_toml_returns_parse_error() -> Result<()> {
    let (_dir, path) = write_temp("[locks\nttl_ms = ")?;
    let result = load_toml_file(&path);
    assert!(matches!(result, Err(Error::ParseError(_))));
    Ok(())
}

#[test]
fn test_directory_path_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| Error::io_error(e.to_string()))?;
    let result = load_toml_file(dir.path());
    assert!(matches!(result, Err(Error::IoError(_))));
    Ok(())
}

#[test]
fn test_explicit_project_path_is_layered() -> Result<()> {
    let (_dir, path) = write_temp("[scheduler.default_safety]\nmax_retries = 4\n")?;
    let config = load_config(Some(&path))?;
    assert_eq!(config.scheduler.default_safety.max_retries, 4);
    Ok(())
}

#[test]
fn test_later_layer_wins_only_when_set() {
    let global = Config {
        locks: super::LocksConfig { ttl_ms: 9_000 },
        ..Config::default()
    };
    let project = Config {
        events: super::EventsConfig {
            channel_capacity: 8,
        },
        ..Config::default()
    };

    let merged = Config::default().merge(global).merge(project);

    assert_eq!(merged.locks.ttl_ms, 9_000);
    assert_eq!(merged.events.channel_capacity, 8);
}

#[test]
fn test_env_overrides() -> Result<()> {
    let env: HashMap<&str, &str> = HashMap::from([
        ("SCENESYNC_LOCK_TTL_MS", "250"),
        ("SCENESYNC_BACKOFF_FACTOR", "3.5"),
        ("SCENESYNC_HISTORY_LIMIT", "25"),
        ("SCENESYNC_LOG", "scenesync_core=trace"),
    ]);

    let config = Config::default().apply_env_with(|name| env.get(name).map(ToString::to_string))?;

    assert_eq!(config.locks.ttl_ms, 250);
    assert!((config.scheduler.default_safety.backoff_factor - 3.5).abs() < f64::EPSILON);
    assert_eq!(config.log.filter, "scenesync_core=trace");
    assert_eq!(config.scheduler.history_limit, 25);
    Ok(())
}

#[test]
fn test_invalid_env_value_is_config_error() {
    let result = Config::default().apply_env_with(|name| {
        (name == "SCENESYNC_IDEMPOTENCY_CAPACITY").then(|| "lots".to_string())
    });
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
