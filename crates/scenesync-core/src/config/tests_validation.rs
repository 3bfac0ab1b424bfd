//! Validation-focused tests for configuration

use super::Config;
use crate::Error;

#[test]
fn test_defaults_are_valid() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_zero_values_are_rejected() {
    let mut config = Config::default();
    config.locks.ttl_ms = 0;
    assert!(matches!(config.validate(), Err(Error::ValidationError(_))));

    let mut config = Config::default();
    config.idempotency.capacity = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.events.channel_capacity = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.scheduler.history_limit = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_backoff_rules() {
    let mut config = Config::default();
    config.scheduler.default_safety.backoff_factor = 0.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.scheduler.default_safety.retry_delay_ms = 10_000;
    config.scheduler.default_safety.max_retry_delay_ms = 1_000;
    assert!(config.validate().is_err());
}

#[test]
fn test_safety_policy_conversion() {
    let mut config = Config::default();
    config.scheduler.default_safety.max_retries = 7;
    assert_eq!(config.default_safety().max_retries, 7);
    assert_eq!(config.lock_ttl().num_milliseconds(), 15_000);
}
