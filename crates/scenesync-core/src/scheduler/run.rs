//! Test run records and their safety policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::RunStatus;
use crate::domain::RunId;

pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Execution limits handed to the executor and used for retry backoff.
///
/// `timeout_ms` is a contract value for the external executor; the scheduler
/// never enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SafetyPolicy {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_retry_delay_ms: u64,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
        }
    }
}

impl SafetyPolicy {
    /// Backoff before retrying after `attempt`:
    /// `retry_delay_ms * backoff_factor^(attempt - 1)`, capped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn retry_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let cap = self.max_retry_delay_ms as f64;
        let raw = self.retry_delay_ms as f64 * self.backoff_factor.powi(exponent);
        if raw.is_finite() {
            raw.clamp(0.0, cap) as u64
        } else {
            self.max_retry_delay_ms
        }
    }

    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::milliseconds(i64::try_from(self.retry_delay_ms(attempt)).unwrap_or(i64::MAX))
    }
}

/// Body of an enqueue request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Opaque scenario definition, interpreted by the executor only.
    pub scenario: Value,
    /// Falls back to the configured default policy.
    #[serde(default)]
    pub safety: Option<SafetyPolicy>,
}

/// One scheduled execution of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRun {
    pub id: RunId,
    pub status: RunStatus,
    /// Starts at 1; incremented by each retry.
    pub attempt: u32,
    pub scenario: Value,
    pub safety: SafetyPolicy,
    /// Set only while a delayed retry waits in the queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_dispatch_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl TestRun {
    #[must_use]
    pub fn new(id: RunId, scenario: Value, safety: SafetyPolicy, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: RunStatus::Queued,
            attempt: 1,
            scenario,
            safety,
            next_dispatch_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            message: None,
            result: None,
        }
    }

    /// Queued and past any retry delay.
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Queued && self.next_dispatch_at.map_or(true, |at| at <= now)
    }

    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempt < self.safety.max_retries
    }
}
