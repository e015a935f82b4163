//! Results reporting and formatting.

use crate::metrics::MetricsSnapshot;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats a metrics snapshot for output.
pub struct SummaryReport;

impl SummaryReport {
    /// Format the snapshot as a console table, one row per operation kind.
    pub fn format_table(snapshot: &MetricsSnapshot) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                "Op", "Count", "Errors", "Items", "Ops/sec", "p50 (ms)", "p95 (ms)", "p99 (ms)",
                "max (ms)",
            ]);

        for op in &snapshot.ops {
            table.add_row(vec![
                op.op.clone(),
                op.count.to_string(),
                op.errors.to_string(),
                op.items.to_string(),
                format!("{:.1}", op.rate_per_sec),
                format!("{:.2}", op.p50_ms),
                format!("{:.2}", op.p95_ms),
                format!("{:.2}", op.p99_ms),
                format!("{:.2}", op.max_ms),
            ]);
        }

        table.add_row(vec![
            "Lock acquired".to_string(),
            snapshot.lock_acquired.to_string(),
        ]);
        table.add_row(vec![
            "Lock timed out".to_string(),
            snapshot.lock_timed_out.to_string(),
        ]);

        table.to_string()
    }

    /// Format the snapshot as JSON.
    pub fn format_json(snapshot: &MetricsSnapshot) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(snapshot)?)
    }
}
