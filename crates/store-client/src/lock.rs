//! Distributed-lock acquisition around a critical section.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::StoreResult;
use crate::StoreOps;

/// Timing parameters for one locked execution.
#[derive(Debug, Clone, Copy)]
pub struct LockTimings {
    /// How long the store holds the lock before expiring it on its own.
    pub lease: Duration,
    /// Total acquisition budget before giving up.
    pub max_wait: Duration,
    /// Pause between acquisition attempts.
    pub retry: Duration,
}

impl Default for LockTimings {
    fn default() -> Self {
        Self {
            lease: Duration::from_millis(500),
            max_wait: Duration::from_millis(500),
            retry: Duration::from_millis(100),
        }
    }
}

/// Run `section` under the named lock.
///
/// Attempts acquisition immediately, then re-tries every `retry` until
/// `max_wait` is spent. Returns `Ok(true)` when the lock was held around the
/// section and `Ok(false)` when the budget ran out, in which case the section
/// never ran. An error inside the section is logged and swallowed so the
/// release still happens; only store errors propagate.
pub async fn execute_locked<S, F, Fut>(
    store: &S,
    name: &str,
    timings: LockTimings,
    section: F,
) -> StoreResult<bool>
where
    S: StoreOps + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = StoreResult<()>>,
{
    let started = Instant::now();
    let lease = loop {
        match store.acquire_lock(name, timings.lease).await? {
            Some(lease) => break lease,
            None => {
                if started.elapsed() + timings.retry > timings.max_wait {
                    return Ok(false);
                }
                tokio::time::sleep(timings.retry).await;
            }
        }
    };

    if let Err(e) = section().await {
        warn!(lock = %name, error = %e, "critical section failed while holding lock");
    }

    store.release_lock(&lease).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::MemoryStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_timings() -> LockTimings {
        LockTimings {
            lease: Duration::from_millis(500),
            max_wait: Duration::from_millis(100),
            retry: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn runs_section_when_uncontended() {
        let store = MemoryStore::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_inner = ran.clone();
        let acquired = execute_locked(&store, "lock_1", fast_timings(), move || async move {
            ran_inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert!(acquired);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_while_lock_is_held() {
        let store = MemoryStore::new();
        store
            .acquire_lock("lock_1", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_inner = ran.clone();
        let acquired = execute_locked(&store, "lock_1", fast_timings(), move || async move {
            ran_inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert!(!acquired);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reacquires_after_lease_expiry() {
        let store = MemoryStore::new();
        store
            .acquire_lock("lock_1", Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let acquired = execute_locked(&store, "lock_1", fast_timings(), || async { Ok(()) })
            .await
            .unwrap();
        assert!(acquired);
    }

    #[tokio::test]
    async fn section_error_is_swallowed_and_lock_released() {
        let store = MemoryStore::new();

        let acquired = execute_locked(&store, "lock_1", fast_timings(), || async {
            Err(StoreError::Command("simulated section failure".to_string()))
        })
        .await
        .unwrap();
        assert!(acquired);

        // Released despite the section failing, so a retake succeeds at once.
        let lease = store
            .acquire_lock("lock_1", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(lease.is_some());
    }

    #[tokio::test]
    async fn contending_holders_never_overlap() {
        let store = Arc::new(MemoryStore::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let violated = Arc::new(AtomicBool::new(false));
        let acquired_total = Arc::new(AtomicUsize::new(0));

        let timings = LockTimings {
            lease: Duration::from_millis(500),
            max_wait: Duration::from_millis(300),
            retry: Duration::from_millis(5),
        };

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = store.clone();
            let inside = inside.clone();
            let violated = violated.clone();
            let acquired_total = acquired_total.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let inside = inside.clone();
                    let violated = violated.clone();
                    let acquired = execute_locked(store.as_ref(), "lock_1", timings, move || async move {
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            violated.store(true, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(3)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                    .unwrap();
                    if acquired {
                        acquired_total.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!violated.load(Ordering::SeqCst), "two holders ran concurrently");
        assert!(acquired_total.load(Ordering::SeqCst) > 0);
    }
}
