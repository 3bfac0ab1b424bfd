//! Configuration merging logic (Immutable functional pattern)
//!
//! Later configs override earlier ones (defaults → global → project → env → CLI).
//! A field left at its built-in default in `other` does not override `self`.

use super::types::{
    Config, EventsConfig, IdempotencyConfig, LocksConfig, LogConfig, SafetyConfig,
    SchedulerConfig,
};

fn pick<T: PartialEq>(current: T, other: T, default: T) -> T {
    if other == default {
        current
    } else {
        other
    }
}

impl Config {
    /// Merge another config into this one (other takes precedence) - immutable pattern
    pub fn merge(self, other: Self) -> Self {
        Self {
            locks: self.locks.merge(other.locks),
            idempotency: self.idempotency.merge(other.idempotency),
            scheduler: self.scheduler.merge(other.scheduler),
            events: self.events.merge(other.events),
            log: self.log.merge(other.log),
        }
    }
}

impl LocksConfig {
    fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            ttl_ms: pick(self.ttl_ms, other.ttl_ms, defaults.ttl_ms),
        }
    }
}

impl IdempotencyConfig {
    fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            ttl_ms: pick(self.ttl_ms, other.ttl_ms, defaults.ttl_ms),
            capacity: pick(self.capacity, other.capacity, defaults.capacity),
        }
    }
}

impl SchedulerConfig {
    fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            history_limit: pick(self.history_limit, other.history_limit, defaults.history_limit),
            default_safety: self.default_safety.merge(other.default_safety),
        }
    }
}

impl SafetyConfig {
    fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            timeout_ms: pick(self.timeout_ms, other.timeout_ms, defaults.timeout_ms),
            max_retries: pick(self.max_retries, other.max_retries, defaults.max_retries),
            retry_delay_ms: pick(self.retry_delay_ms, other.retry_delay_ms, defaults.retry_delay_ms),
            backoff_factor: pick(self.backoff_factor, other.backoff_factor, defaults.backoff_factor),
            max_retry_delay_ms: pick(
                self.max_retry_delay_ms,
                other.max_retry_delay_ms,
                defaults.max_retry_delay_ms,
            ),
        }
    }
}

impl EventsConfig {
    fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            channel_capacity: pick(
                self.channel_capacity,
                other.channel_capacity,
                defaults.channel_capacity,
            ),
        }
    }
}

impl LogConfig {
    fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            filter: pick(self.filter, other.filter, defaults.filter),
        }
    }
}
