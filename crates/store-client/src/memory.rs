//! In-process store backend for tests.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::{LockLease, StoreOps};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

struct LockEntry {
    token: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Entry>,
    sets: HashMap<String, HashSet<String>>,
    locks: HashMap<String, LockEntry>,
}

impl Inner {
    // Expired entries are dropped lazily on read.
    fn read(&mut self, key: &str) -> Option<String> {
        let expired = self
            .strings
            .get(key)
            .is_some_and(|e| e.expires_at.is_some_and(|at| at <= Instant::now()));
        if expired {
            self.strings.remove(key);
            return None;
        }
        self.strings.get(key).map(|e| e.value.clone())
    }
}

/// In-memory `StoreOps` implementation with real lease-expiry semantics.
///
/// Lets the workload and lock logic run in tests without a live server.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreOps for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.read(key))
    }

    async fn set(&self, key: &str, value: &str, expire: Option<Duration>) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expire.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        let mut inner = self.inner.lock().await;
        Ok(keys.iter().map(|key| inner.read(key)).collect())
    }

    async fn add_to_set(&self, collection: &str, members: &[String]) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sets
            .entry(collection.to_string())
            .or_default()
            .extend(members.iter().cloned());
        Ok(())
    }

    async fn set_members(&self, collection: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sets
            .get(collection)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn acquire_lock(&self, name: &str, lease: Duration) -> StoreResult<Option<LockLease>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        if inner.locks.get(name).is_some_and(|l| l.expires_at > now) {
            return Ok(None);
        }

        let token = Uuid::new_v4().to_string();
        inner.locks.insert(
            name.to_string(),
            LockEntry {
                token: token.clone(),
                expires_at: now + lease,
            },
        );
        Ok(Some(LockLease {
            name: name.to_string(),
            token,
        }))
    }

    async fn release_lock(&self, lease: &LockLease) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        // Token check mirrors the compare-and-delete release on the server.
        if inner
            .locks
            .get(&lease.name)
            .is_some_and(|l| l.token == lease.token)
        {
            inner.locks.remove(&lease.name);
        }
        Ok(())
    }
}
