//! Request-scoped coordination state kept beside the tree: lock leases and
//! the idempotency replay cache. Neither depends on tree structure.

pub mod idempotency;
pub mod locks;

pub use idempotency::{
    CachedResponse, IdempotencyCache, DEFAULT_IDEMPOTENCY_CAPACITY, DEFAULT_IDEMPOTENCY_TTL_MS,
};
pub use locks::{
    ContentionRecord, LockConflict, LockLease, LockManager, LockStats, DEFAULT_LOCK_TTL_MS,
    RECENT_CONTENTION_LIMIT,
};
