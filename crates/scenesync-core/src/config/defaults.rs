//! Default value implementations

use chrono::Duration;

use super::types::{
    Config, EventsConfig, IdempotencyConfig, LocksConfig, LogConfig, SafetyConfig,
    SchedulerConfig,
};
use crate::{
    coordination::{DEFAULT_IDEMPOTENCY_CAPACITY, DEFAULT_IDEMPOTENCY_TTL_MS, DEFAULT_LOCK_TTL_MS},
    scheduler::{SafetyPolicy, DEFAULT_HISTORY_LIMIT},
};

pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_LOG_FILTER: &str = "info";

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_LOCK_TTL_MS.unsigned_abs(),
        }
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_IDEMPOTENCY_TTL_MS.unsigned_abs(),
            capacity: DEFAULT_IDEMPOTENCY_CAPACITY,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_safety: SafetyConfig::default(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyPolicy::default().into()
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

impl From<SafetyPolicy> for SafetyConfig {
    fn from(policy: SafetyPolicy) -> Self {
        Self {
            timeout_ms: policy.timeout_ms,
            max_retries: policy.max_retries,
            retry_delay_ms: policy.retry_delay_ms,
            backoff_factor: policy.backoff_factor,
            max_retry_delay_ms: policy.max_retry_delay_ms,
        }
    }
}

impl From<&SafetyConfig> for SafetyPolicy {
    fn from(config: &SafetyConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            backoff_factor: config.backoff_factor,
            max_retry_delay_ms: config.max_retry_delay_ms,
        }
    }
}

impl Config {
    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        millis(self.locks.ttl_ms)
    }

    #[must_use]
    pub fn idempotency_ttl(&self) -> Duration {
        millis(self.idempotency.ttl_ms)
    }

    #[must_use]
    pub fn default_safety(&self) -> SafetyPolicy {
        SafetyPolicy::from(&self.scheduler.default_safety)
    }
}
