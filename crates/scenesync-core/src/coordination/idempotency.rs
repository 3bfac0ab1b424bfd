//! Replay cache for client-supplied idempotency keys.
//!
//! Bounded by TTL and by entry count; once over capacity the oldest-inserted
//! entry goes first. Bodies are cloned on the way in and on the way out, so
//! callers never share a mutable value with the cache.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_IDEMPOTENCY_TTL_MS: i64 = 600_000;
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 1024;

/// A stored `(status, body)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub status: u16,
    pub body: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IdempotencyCache {
    entries: IndexMap<String, CachedResponse>,
    ttl: Duration,
    capacity: usize,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(
            Duration::milliseconds(DEFAULT_IDEMPOTENCY_TTL_MS),
            DEFAULT_IDEMPOTENCY_CAPACITY,
        )
    }
}

/// Empty keys behave like missing ones.
fn usable(key: Option<&str>) -> Option<&str> {
    key.filter(|k| !k.trim().is_empty())
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CachedResponse, now: DateTime<Utc>) -> bool {
        now - entry.created_at >= self.ttl
    }

    /// Look up a key. Expired entries are removed and reported absent.
    pub fn get(&mut self, key: Option<&str>, now: DateTime<Utc>) -> Option<CachedResponse> {
        let key = usable(key)?;
        let expired = self
            .entries
            .get(key)
            .map(|entry| self.is_expired(entry, now))?;
        if expired {
            self.entries.shift_remove(key);
            debug!(key, "Idempotency entry expired");
            return None;
        }
        self.entries.get(key).cloned()
    }

    /// Store a response. No-op without a usable key.
    pub fn set(&mut self, key: Option<&str>, status: u16, body: &Value, now: DateTime<Utc>) {
        let Some(key) = usable(key) else {
            return;
        };

        self.evict_expired(now);
        // Re-setting a key makes it the newest entry.
        self.entries.shift_remove(key);
        self.entries.insert(
            key.to_string(),
            CachedResponse {
                status,
                body: body.clone(),
                created_at: now,
            },
        );

        while self.entries.len() > self.capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                debug!(key = %evicted, "Evicted idempotency entry over capacity");
            }
        }
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.created_at < ttl);
    }
}
