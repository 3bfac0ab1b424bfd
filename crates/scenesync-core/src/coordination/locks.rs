//! Path-scoped lock leases for command owners.
//!
//! A lease on a path covers the whole subtree below it. Leases expire by
//! wall-clock TTL and are pruned lazily; an expired lease never blocks.
//!
//! Acquisition is all-or-nothing: either every requested path is granted or
//! none is, and the first exact-or-ancestor conflict (root-most first, in
//! request order) is reported.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::collections::{BTreeMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{InstancePath, LockOwner};

/// Default lease TTL in milliseconds.
pub const DEFAULT_LOCK_TTL_MS: i64 = 15_000;

/// How many contentions the diagnostics keep.
pub const RECENT_CONTENTION_LIMIT: usize = 16;

/// An active lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockLease {
    pub owner: LockOwner,
    pub path: InstancePath,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Why an acquisition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConflict {
    /// The path the caller asked for.
    pub requested_path: InstancePath,
    /// The held path blocking it (the requested path or an ancestor).
    pub path: InstancePath,
    pub owner: LockOwner,
    pub expires_at: DateTime<Utc>,
}

/// Diagnostics record of one refused acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentionRecord {
    pub requester: LockOwner,
    pub requested_path: InstancePath,
    pub held_by: LockOwner,
    pub held_path: InstancePath,
    pub at: DateTime<Utc>,
}

/// Aggregate view over live leases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStats {
    pub count: usize,
    pub unique_owners: usize,
    pub min_remaining_ms: Option<i64>,
    pub max_remaining_ms: Option<i64>,
    pub contention_count: u64,
    pub recent_contentions: Vec<ContentionRecord>,
}

/// In-memory lease table keyed by path.
#[derive(Debug, Clone)]
pub struct LockManager {
    leases: BTreeMap<InstancePath, LockLease>,
    ttl: Duration,
    contention_count: u64,
    recent: VecDeque<ContentionRecord>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::with_ttl(Duration::milliseconds(DEFAULT_LOCK_TTL_MS))
    }
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            leases: BTreeMap::new(),
            ttl,
            contention_count: 0,
            recent: VecDeque::with_capacity(RECENT_CONTENTION_LIMIT),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.leases.retain(|_, lease| lease.expires_at > now);
    }

    fn blocking_lease(
        &self,
        owner: &LockOwner,
        path: &InstancePath,
        now: DateTime<Utc>,
    ) -> Option<&LockLease> {
        path.ancestors_and_self()
            .filter_map(|candidate| self.leases.get(&candidate))
            .find(|lease| lease.expires_at > now && lease.owner != *owner)
    }

    /// Acquire every path for `owner`, or nothing.
    ///
    /// Re-acquiring a path the owner already holds refreshes its expiry.
    /// The root path is never locked.
    ///
    /// # Errors
    ///
    /// Returns the first conflicting lease held by another owner.
    pub fn acquire(
        &mut self,
        owner: &LockOwner,
        paths: &[InstancePath],
        now: DateTime<Utc>,
    ) -> Result<Vec<LockLease>, LockConflict> {
        let conflict = paths.iter().find_map(|path| {
            self.blocking_lease(owner, path, now)
                .map(|lease| LockConflict {
                    requested_path: path.clone(),
                    path: lease.path.clone(),
                    owner: lease.owner.clone(),
                    expires_at: lease.expires_at,
                })
        });

        if let Some(conflict) = conflict {
            self.record_contention(owner, &conflict, now);
            return Err(conflict);
        }

        let expires_at = now + self.ttl;
        let granted: Vec<LockLease> = paths
            .iter()
            .filter(|path| !path.is_root())
            .map(|path| {
                let lease = LockLease {
                    owner: owner.clone(),
                    path: path.clone(),
                    acquired_at: now,
                    expires_at,
                };
                self.leases.insert(path.clone(), lease.clone());
                lease
            })
            .collect();

        debug!(%owner, count = granted.len(), "Acquired locks");
        Ok(granted)
    }

    fn record_contention(&mut self, owner: &LockOwner, conflict: &LockConflict, now: DateTime<Utc>) {
        warn!(
            requester = %owner,
            requested = %conflict.requested_path,
            held_by = %conflict.owner,
            held_path = %conflict.path,
            "Lock contention"
        );
        self.contention_count += 1;
        if self.recent.len() == RECENT_CONTENTION_LIMIT {
            self.recent.pop_front();
        }
        self.recent.push_back(ContentionRecord {
            requester: owner.clone(),
            requested_path: conflict.requested_path.clone(),
            held_by: conflict.owner.clone(),
            held_path: conflict.path.clone(),
            at: now,
        });
    }

    /// Drop every lease held by `owner`. Returns how many were dropped.
    pub fn release(&mut self, owner: &LockOwner) -> usize {
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.owner != *owner);
        let released = before - self.leases.len();
        if released > 0 {
            debug!(%owner, released, "Released locks");
        }
        released
    }

    /// Live leases sorted by path.
    pub fn active_locks(&mut self, now: DateTime<Utc>) -> Vec<LockLease> {
        self.prune(now);
        self.leases.values().cloned().collect()
    }

    /// Stats over live leases only.
    pub fn stats(&mut self, now: DateTime<Utc>) -> LockStats {
        self.prune(now);
        let remaining: Vec<i64> = self
            .leases
            .values()
            .map(|lease| (lease.expires_at - now).num_milliseconds())
            .collect();
        let owners: HashSet<&LockOwner> = self.leases.values().map(|lease| &lease.owner).collect();

        LockStats {
            count: self.leases.len(),
            unique_owners: owners.len(),
            min_remaining_ms: remaining.iter().min().copied(),
            max_remaining_ms: remaining.iter().max().copied(),
            contention_count: self.contention_count,
            recent_contentions: self.recent.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(s: &str) -> LockOwner {
        LockOwner::parse(s).unwrap_or_else(|_| LockOwner::for_request(0))
    }

    fn path(s: &str) -> InstancePath {
        InstancePath::from_dotted(s)
    }

    #[test]
    fn test_ancestor_lock_blocks_descendant() {
        // GIVEN owner a holds Workspace.Folder
        let mut locks = LockManager::new();
        let now = Utc::now();
        let granted = locks.acquire(&owner("a"), &[path("Workspace.Folder")], now);
        assert!(granted.is_ok());

        // WHEN owner b asks for a descendant
        let result = locks.acquire(&owner("b"), &[path("Workspace.Folder.Part")], now);

        // THEN the ancestor lease is reported
        let conflict = result.err();
        assert_eq!(conflict.as_ref().map(|c| c.path.path_string()), Some("Workspace.Folder".into()));
        assert_eq!(conflict.map(|c| c.owner), Some(owner("a")));
    }

    #[test]
    fn test_acquisition_is_all_or_nothing() {
        let mut locks = LockManager::new();
        let now = Utc::now();
        let _ = locks.acquire(&owner("a"), &[path("W.B")], now);

        let result = locks.acquire(&owner("b"), &[path("W.A"), path("W.B")], now);

        assert!(result.is_err());
        let active = locks.active_locks(now);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner, owner("a"));
    }

    #[test]
    fn test_same_owner_reentry_refreshes() {
        let mut locks = LockManager::new();
        let t0 = Utc::now();
        let _ = locks.acquire(&owner("a"), &[path("W.A")], t0);
        let t1 = t0 + Duration::milliseconds(1_000);

        let again = locks.acquire(&owner("a"), &[path("W.A"), path("W.A.B")], t1);

        assert!(again.is_ok());
        let active = locks.active_locks(t1);
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|lease| lease.expires_at == t1 + locks.ttl()));
    }

    #[test]
    fn test_expired_lease_never_blocks() {
        let mut locks = LockManager::with_ttl(Duration::milliseconds(100));
        let t0 = Utc::now();
        let _ = locks.acquire(&owner("a"), &[path("W.A")], t0);

        let later = t0 + Duration::milliseconds(101);
        assert!(locks.acquire(&owner("b"), &[path("W.A")], later).is_ok());
        assert_eq!(locks.stats(later).unique_owners, 1);
    }

    #[test]
    fn test_release_and_stats() {
        let mut locks = LockManager::new();
        let now = Utc::now();
        let _ = locks.acquire(&owner("a"), &[path("W.A"), path("W.B")], now);
        let _ = locks.acquire(&owner("b"), &[path("W.A.C")], now);

        let stats = locks.stats(now);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.contention_count, 1);
        assert_eq!(stats.recent_contentions.len(), 1);
        assert_eq!(stats.max_remaining_ms, Some(DEFAULT_LOCK_TTL_MS));

        assert_eq!(locks.release(&owner("a")), 2);
        assert_eq!(locks.stats(now).count, 0);
        assert_eq!(locks.stats(now).min_remaining_ms, None);
    }

    #[test]
    fn test_recent_contentions_are_bounded() {
        let mut locks = LockManager::new();
        let now = Utc::now();
        let _ = locks.acquire(&owner("a"), &[path("W")], now);
        for n in 0..(RECENT_CONTENTION_LIMIT as u64 + 4) {
            let _ = locks.acquire(&LockOwner::for_request(n), &[path("W.X")], now);
        }

        let stats = locks.stats(now);
        assert_eq!(stats.contention_count, RECENT_CONTENTION_LIMIT as u64 + 4);
        assert_eq!(stats.recent_contentions.len(), RECENT_CONTENTION_LIMIT);
        assert_eq!(
            stats.recent_contentions.last().map(|c| c.requester.clone()),
            Some(LockOwner::for_request(RECENT_CONTENTION_LIMIT as u64 + 3))
        );
    }
}
