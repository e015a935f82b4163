//! Distributed-lock contention loops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use store_client::{execute_locked, StoreOps, StoreResult};

use crate::config::LockConfig;
use crate::metrics::{MetricsHandle, OpKind};

/// The fixed set of contended lock names. With several thread groups, each
/// name is fought over by one loop per group.
pub const LOCK_NAMES: [&str; 3] = ["lock_1", "lock_2", "lock_3"];

/// Perpetually contend for `name`.
///
/// Each round tries to acquire the lock within the configured wait budget,
/// holds it for the simulated work duration, releases, and records the
/// end-to-end latency whether or not the lock was obtained.
pub async fn lock_loop<S: StoreOps + 'static>(
    store: Arc<S>,
    name: &'static str,
    lock: LockConfig,
    metrics: MetricsHandle,
    mut shutdown: broadcast::Receiver<()>,
) {
    let timings = lock.timings();
    let hold = lock.hold();
    loop {
        let started = Instant::now();
        let result = tokio::select! {
            _ = shutdown.recv() => break,
            r = execute_locked(store.as_ref(), name, timings, || simulated_work(hold)) => r,
        };
        match result {
            Ok(acquired) => metrics.record_lock(name, acquired, started.elapsed()).await,
            Err(e) => metrics.record_error(OpKind::Lock, name, &e).await,
        }
    }
}

/// Stand-in critical section: hold the lock for a fixed time doing nothing.
async fn simulated_work(hold: Duration) -> StoreResult<()> {
    tokio::time::sleep(hold).await;
    Ok(())
}
