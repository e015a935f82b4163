//! Metrics collection and statistics.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use store_client::StoreError;

/// Workload operation kinds, labelled the way the operator sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    SetKey,
    GetKey,
    AddKeys,
    FindKeys,
    GetKeys,
    Lock,
}

impl OpKind {
    pub const ALL: [OpKind; 6] = [
        OpKind::SetKey,
        OpKind::GetKey,
        OpKind::AddKeys,
        OpKind::FindKeys,
        OpKind::GetKeys,
        OpKind::Lock,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OpKind::SetKey => "SetKey",
            OpKind::GetKey => "GetKey",
            OpKind::AddKeys => "AddKeys",
            OpKind::FindKeys => "FindKeys",
            OpKind::GetKeys => "GetKeys",
            OpKind::Lock => "Lock",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregate state for one operation kind.
struct KindStats {
    histogram: Histogram<u64>,
    ok: u64,
    errors: u64,
    items: u64,
}

impl KindStats {
    fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            ok: 0,
            errors: 0,
            items: 0,
        }
    }
}

/// Collects per-operation latency while the workload loops run.
pub struct MetricsCollector {
    kinds: [KindStats; 6],
    lock_acquired: u64,
    lock_timed_out: u64,
    started: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            kinds: std::array::from_fn(|_| KindStats::new()),
            lock_acquired: 0,
            lock_timed_out: 0,
            started: Instant::now(),
        }
    }

    fn record(&mut self, kind: OpKind, items: usize, elapsed: Duration) {
        let stats = &mut self.kinds[kind.index()];
        stats.ok += 1;
        stats.items += items as u64;
        stats.histogram.record(elapsed.as_micros() as u64).ok();
    }

    fn record_failure(&mut self, kind: OpKind) {
        self.kinds[kind.index()].errors += 1;
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let elapsed_secs = self.started.elapsed().as_secs_f64();
        let ops = OpKind::ALL
            .iter()
            .filter_map(|kind| {
                let stats = &self.kinds[kind.index()];
                if stats.ok == 0 && stats.errors == 0 {
                    return None;
                }
                let h = &stats.histogram;
                Some(OpSummary {
                    op: kind.label().to_string(),
                    count: stats.ok,
                    errors: stats.errors,
                    items: stats.items,
                    rate_per_sec: if elapsed_secs > 0.0 {
                        (stats.ok + stats.errors) as f64 / elapsed_secs
                    } else {
                        0.0
                    },
                    p50_ms: h.value_at_percentile(50.0) as f64 / 1000.0,
                    p95_ms: h.value_at_percentile(95.0) as f64 / 1000.0,
                    p99_ms: h.value_at_percentile(99.0) as f64 / 1000.0,
                    max_ms: h.max() as f64 / 1000.0,
                    avg_ms: h.mean() / 1000.0,
                })
            })
            .collect();

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            elapsed_secs,
            ops,
            lock_acquired: self.lock_acquired,
            lock_timed_out: self.lock_timed_out,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle the workload loops record through.
///
/// Every operation lands in two sinks: one structured log event at the
/// moment it finishes, and the in-memory histogram behind this handle.
#[derive(Clone)]
pub struct MetricsHandle {
    collector: Arc<Mutex<MetricsCollector>>,
}

impl MetricsHandle {
    pub fn new() -> Self {
        Self {
            collector: Arc::new(Mutex::new(MetricsCollector::new())),
        }
    }

    /// Record a completed operation. `label` is the key or collection
    /// involved and `items` how many entries the call touched.
    pub async fn record_success(&self, kind: OpKind, label: &str, items: usize, elapsed: Duration) {
        info!(
            op = %kind,
            key = label,
            items,
            elapsed_ms = elapsed.as_millis() as u64,
            "op complete"
        );
        self.collector.lock().await.record(kind, items, elapsed);
    }

    /// Record a failed operation.
    pub async fn record_error(&self, kind: OpKind, label: &str, err: &StoreError) {
        error!(op = %kind, key = label, error = %err, "op failed");
        self.collector.lock().await.record_failure(kind);
    }

    /// Record one lock-contention round. Latency covers the full acquire,
    /// hold and release, and is kept whether or not the lock was obtained.
    pub async fn record_lock(&self, name: &str, acquired: bool, elapsed: Duration) {
        info!(
            op = %OpKind::Lock,
            key = name,
            acquired,
            elapsed_ms = elapsed.as_millis() as u64,
            "op complete"
        );
        let mut collector = self.collector.lock().await;
        collector.record(OpKind::Lock, 1, elapsed);
        if acquired {
            collector.lock_acquired += 1;
        } else {
            collector.lock_timed_out += 1;
        }
    }

    /// Point-in-time aggregate view.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.collector.lock().await.snapshot()
    }
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate results at one point in time, also served by `/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub elapsed_secs: f64,
    pub ops: Vec<OpSummary>,
    pub lock_acquired: u64,
    pub lock_timed_out: u64,
}

/// One operation kind's aggregate numbers. `items` totals the entries the
/// successful calls touched, so batch sizes stay visible after aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpSummary {
    pub op: String,
    pub count: u64,
    pub errors: u64,
    pub items: u64,
    pub rate_per_sec: f64,

    // Latency (ms)
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
}

/// Logs an aggregate summary at a fixed cadence until shutdown.
pub async fn report_loop(
    metrics: MetricsHandle,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let snapshot = metrics.snapshot().await;
        for op in &snapshot.ops {
            info!(
                op = %op.op,
                count = op.count,
                errors = op.errors,
                rate_per_sec = format!("{:.1}", op.rate_per_sec),
                p50_ms = format!("{:.2}", op.p50_ms),
                p99_ms = format!("{:.2}", op.p99_ms),
                max_ms = format!("{:.2}", op.max_ms),
                "latency summary"
            );
        }
        info!(
            acquired = snapshot.lock_acquired,
            timed_out = snapshot.lock_timed_out,
            "lock contention summary"
        );
    }
}
