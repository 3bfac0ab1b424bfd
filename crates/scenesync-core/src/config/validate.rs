//! Configuration validation

use super::types::Config;
use crate::{Error, Result};

impl Config {
    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any values are out of range or invalid
    pub fn validate(&self) -> Result<()> {
        if self.locks.ttl_ms == 0 {
            return Err(Error::validation_error("locks.ttl_ms must be greater than 0"));
        }
        if self.idempotency.ttl_ms == 0 {
            return Err(Error::validation_error(
                "idempotency.ttl_ms must be greater than 0",
            ));
        }
        if self.idempotency.capacity == 0 {
            return Err(Error::validation_error(
                "idempotency.capacity must be greater than 0",
            ));
        }

        if self.scheduler.history_limit == 0 {
            return Err(Error::validation_error(
                "scheduler.history_limit must be greater than 0",
            ));
        }
        let safety = &self.scheduler.default_safety;
        if !safety.backoff_factor.is_finite() || safety.backoff_factor < 1.0 {
            return Err(Error::validation_error(
                "scheduler.default_safety.backoff_factor must be a finite number >= 1.0",
            ));
        }
        if safety.max_retry_delay_ms < safety.retry_delay_ms {
            return Err(Error::validation_error(
                "scheduler.default_safety.max_retry_delay_ms must be >= retry_delay_ms",
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(Error::validation_error(
                "events.channel_capacity must be greater than 0",
            ));
        }
        if self.log.filter.trim().is_empty() {
            return Err(Error::validation_error("log.filter cannot be empty"));
        }

        Ok(())
    }
}
