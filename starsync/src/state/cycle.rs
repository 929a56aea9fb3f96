use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::merge::RowRejection;
use crate::types::{CdcValue, TableName};

/// Aggregate outcome of one incremental load cycle.
///
/// Produced fresh by every `run_cycle` call and consumed by the external
/// scheduler or monitor. Serializable so it can be shipped as-is. Row- and
/// table-level failures live inside the per-table reports; they never escape
/// the cycle as errors.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Total wall-clock duration of the cycle in milliseconds.
    pub elapsed_ms: u64,
    /// Per-table reports, in configuration order.
    pub tables: Vec<TableReport>,
}

impl CycleResult {
    /// Returns the report for a specific table, if it was part of the cycle.
    pub fn table(&self, table: &TableName) -> Option<&TableReport> {
        self.tables.iter().find(|report| &report.table == table)
    }

    /// Total number of rows applied across all tables.
    pub fn rows_applied(&self) -> usize {
        self.tables
            .iter()
            .map(|report| match &report.status {
                TableStatus::Completed { rows_applied, .. } => *rows_applied,
                _ => 0,
            })
            .sum()
    }

    /// Returns `true` when at least one table failed or was skipped.
    pub fn has_failures(&self) -> bool {
        self.tables.iter().any(|report| {
            matches!(
                report.status,
                TableStatus::Failed { .. } | TableStatus::Skipped { .. }
            )
        })
    }
}

/// Outcome of processing a single table within a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    /// The table this report describes.
    pub table: TableName,
    /// Wall-clock duration spent on this table in milliseconds.
    pub elapsed_ms: u64,
    /// What happened to the table.
    #[serde(flatten)]
    pub status: TableStatus,
}

impl TableReport {
    /// Returns `true` when the table's merge completed.
    pub fn is_completed(&self) -> bool {
        matches!(self.status, TableStatus::Completed { .. })
    }
}

/// Per-table status within a [`CycleResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    /// The merge ran to completion. Individual rows may still have been
    /// rejected; rejected rows are quarantined, not retried.
    Completed {
        /// Rows upserted into the warehouse.
        rows_applied: usize,
        /// In-batch duplicates discarded by last-writer-wins.
        rows_superseded: usize,
        /// Rows rejected with their reasons.
        rejections: Vec<RowRejection>,
        /// The advanced watermark, or `None` when nothing was selected or the
        /// advancement was refused as a regression.
        new_watermark: Option<CdcValue>,
    },
    /// An infrastructure failure interrupted selection or merge. The watermark
    /// was not advanced and the whole table is safe to retry next cycle.
    Failed {
        /// Classification of the failure.
        kind: String,
        /// Human-readable failure description.
        error: String,
    },
    /// The table was not processed because a table it depends on did not
    /// complete this cycle.
    Skipped {
        /// The dependency that blocked this table.
        blocked_on: TableName,
    },
    /// The cycle was cancelled before this table started.
    Cancelled,
}
