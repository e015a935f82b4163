//! Client abstractions for the shared key-value store.
//!
//! Provides:
//! - `StoreOps`, the capability surface the workload loops run against
//! - `RedisStore`, the production client over one multiplexed connection
//! - `MemoryStore`, an in-process implementation for tests
//! - `execute_locked`, distributed-lock acquisition around a critical section

pub mod client;
pub mod error;
pub mod lock;
pub mod memory;

pub use client::RedisStore;
pub use error::{StoreError, StoreResult};
pub use lock::{execute_locked, LockTimings};
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;

/// A lease on a named distributed lock.
///
/// The token is unique per acquisition; release only removes the lock while
/// the token still matches, so a lease that expired and was re-granted to
/// someone else cannot be released by the previous holder.
#[derive(Debug, Clone)]
pub struct LockLease {
    pub name: String,
    pub token: String,
}

/// Operations every store backend exposes to the workload loops.
#[async_trait]
pub trait StoreOps: Send + Sync {
    /// Fetch the value at `key`, or `None` when absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally overwrite `key`, optionally expiring after `expire`.
    async fn set(&self, key: &str, value: &str, expire: Option<Duration>) -> StoreResult<()>;

    /// Fetch many keys in one round trip; output is positionally aligned
    /// with the input, with `None` for absent keys.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// Union `members` into the set stored at `collection`.
    async fn add_to_set(&self, collection: &str, members: &[String]) -> StoreResult<()>;

    /// Snapshot the current members of the set at `collection` (unordered).
    async fn set_members(&self, collection: &str) -> StoreResult<Vec<String>>;

    /// Try to take the named lock once with the given lease duration.
    /// Returns `None` when the lock is currently held by someone else.
    async fn acquire_lock(&self, name: &str, lease: Duration) -> StoreResult<Option<LockLease>>;

    /// Release a held lock if the lease token still matches.
    async fn release_lock(&self, lease: &LockLease) -> StoreResult<()>;
}
