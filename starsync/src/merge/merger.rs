use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::error::SyncResult;
use crate::plan::TablePlan;
use crate::sink::base::{UpsertRow, WarehouseSink};
use crate::types::{CdcValue, ChangeRow, RowKey, TableName, TableRow};

/// Why a change row was not applied to the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// A referenced key does not exist in the referenced table.
    UnresolvedReference {
        /// The referencing column.
        column: String,
        /// The table the key should have resolved in.
        table: TableName,
    },
    /// The row itself is unusable: wrong arity, null key, or a CDC cell that
    /// is not a comparable change marker.
    MalformedRow { detail: String },
}

/// A rejected change row with its reason.
///
/// Rejections are quarantine, not failure: they are reported per row in the
/// cycle result and never abort sibling rows or the table's merge. A rejected
/// row is not retried automatically — it reappears only if the source row is
/// corrected and picked up by a later CDC window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRejection {
    /// Primary key of the rejected row, as far as it could be extracted.
    pub key: RowKey,
    /// Why the row was rejected.
    pub reason: RejectReason,
}

/// Outcome of applying one batch of change rows to a table.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Rows upserted into the warehouse.
    pub rows_applied: usize,
    /// In-batch duplicates discarded by last-writer-wins.
    pub rows_superseded: usize,
    /// Rows rejected with their reasons.
    pub rejections: Vec<RowRejection>,
    /// Greatest CDC value among all rows seen, applied and rejected alike.
    ///
    /// Rejected rows are quarantined permanently, so the watermark must move
    /// past them too — otherwise they would be re-selected every cycle.
    pub max_cdc_seen: Option<CdcValue>,
}

impl MergeOutcome {
    fn observe_cdc(&mut self, cdc: &CdcValue) {
        match &self.max_cdc_seen {
            Some(current) if !cdc.is_after(current) => {}
            _ => self.max_cdc_seen = Some(cdc.clone()),
        }
    }
}

/// Applies change rows to a warehouse table with upsert semantics.
///
/// Within a batch, duplicate primary keys are resolved by last-writer-wins on
/// the CDC value; the superseded versions are discarded silently (counted, not
/// errors). Surviving rows replace the stored row wholesale when the key
/// exists and are inserted otherwise. For tables with declared references,
/// every referenced key must resolve in the referenced table at merge time;
/// rows that fail this check are rejected individually.
#[derive(Debug, Clone)]
pub struct Merger<S> {
    sink: S,
}

impl<S> Merger<S>
where
    S: WarehouseSink + Send + Sync,
{
    /// Creates a merger writing to the given sink.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Applies one batch of raw change rows to the plan's table.
    ///
    /// Returns an error only for infrastructure failures in the sink; row
    /// problems surface as rejections in the outcome.
    pub async fn apply(&self, plan: &TablePlan, rows: Vec<TableRow>) -> SyncResult<MergeOutcome> {
        let mut outcome = MergeOutcome::default();

        // Last-writer-wins conflict resolution, keyed by primary key.
        let mut survivors: HashMap<RowKey, ChangeRow> = HashMap::with_capacity(rows.len());
        for row in rows {
            let change = match to_change_row(plan, row) {
                Ok(change) => change,
                Err(rejection) => {
                    outcome.rejections.push(rejection);
                    continue;
                }
            };

            outcome.observe_cdc(&change.cdc);

            match survivors.entry(change.key.clone()) {
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(change);
                }
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    outcome.rows_superseded += 1;
                    // Keep the version with the greatest CDC value; among equal
                    // markers the later batch position wins.
                    if !entry.get().cdc.is_after(&change.cdc) {
                        entry.insert(change);
                    }
                }
            }
        }

        // Referential integrity: every declared reference must resolve in the
        // already-merged referenced table. The storage engine is not trusted
        // to enforce this.
        for reference in &plan.references {
            let mut unresolved: Vec<RowKey> = Vec::new();
            let mut candidates: HashSet<RowKey> = HashSet::new();

            for (key, change) in &survivors {
                let cell = &change.row.values()[reference.column_idx];
                if cell.is_null() {
                    unresolved.push(key.clone());
                } else {
                    candidates.insert(RowKey::new(vec![cell.clone()]));
                }
            }

            let existing = self
                .sink
                .filter_existing(&reference.table, candidates.into_iter().collect())
                .await?;

            for (key, change) in &survivors {
                if unresolved.contains(key) {
                    continue;
                }

                let cell = &change.row.values()[reference.column_idx];
                if !existing.contains(&RowKey::new(vec![cell.clone()])) {
                    unresolved.push(key.clone());
                }
            }

            for key in unresolved {
                if let Some(change) = survivors.remove(&key) {
                    outcome.rejections.push(RowRejection {
                        key: change.key,
                        reason: RejectReason::UnresolvedReference {
                            column: reference.column.clone(),
                            table: reference.table.clone(),
                        },
                    });
                }
            }
        }

        let upserts: Vec<UpsertRow> = survivors
            .into_values()
            .map(|change| UpsertRow {
                key: change.key,
                row: change.row,
            })
            .collect();

        outcome.rows_applied = upserts.len();

        if !upserts.is_empty() {
            self.sink.upsert_rows(&plan.table, upserts).await?;
        }

        debug!(
            table = %plan.table,
            applied = outcome.rows_applied,
            superseded = outcome.rows_superseded,
            rejected = outcome.rejections.len(),
            "merged change batch"
        );

        Ok(outcome)
    }
}

/// Extracts the key and change marker from a raw row, validating its shape.
fn to_change_row(plan: &TablePlan, row: TableRow) -> Result<ChangeRow, RowRejection> {
    let expected = plan.config.columns.len();
    if row.values().len() != expected {
        return Err(RowRejection {
            key: RowKey::new(vec![]),
            reason: RejectReason::MalformedRow {
                detail: format!(
                    "expected {expected} columns, got {}",
                    row.values().len()
                ),
            },
        });
    }

    let key = RowKey::from_row(&row, &plan.key_indices);

    if key.values().iter().any(|cell| cell.is_null()) {
        return Err(RowRejection {
            key,
            reason: RejectReason::MalformedRow {
                detail: "primary key contains null".to_string(),
            },
        });
    }

    let Some(cdc) = CdcValue::from_cell(&row.values()[plan.cdc_idx]) else {
        return Err(RowRejection {
            key,
            reason: RejectReason::MalformedRow {
                detail: format!(
                    "column `{}` does not hold a comparable change marker",
                    plan.config.cdc_column
                ),
            },
        });
    };

    Ok(ChangeRow { key, cdc, row })
}

#[cfg(test)]
mod tests {
    use starsync_config::shared::{TableConfig, TableReference};

    use super::*;
    use crate::sink::memory::MemoryWarehouse;
    use crate::types::Cell;

    fn users_plan() -> TablePlan {
        TablePlan::resolve(&TableConfig {
            schema: "analytics".to_string(),
            table: "dim_user".to_string(),
            columns: vec![
                "user_id".to_string(),
                "user_name".to_string(),
                "updated_at".to_string(),
            ],
            cdc_column: "updated_at".to_string(),
            primary_key: vec!["user_id".to_string()],
            references: vec![],
            depends_on: vec![],
            from_date: None,
            initial_load: false,
        })
        .unwrap()
    }

    fn fact_plan() -> TablePlan {
        TablePlan::resolve(&TableConfig {
            schema: "analytics".to_string(),
            table: "fact_stream".to_string(),
            columns: vec![
                "stream_id".to_string(),
                "user_id".to_string(),
                "played_at".to_string(),
            ],
            cdc_column: "played_at".to_string(),
            primary_key: vec!["stream_id".to_string()],
            references: vec![TableReference {
                column: "user_id".to_string(),
                table: "analytics.dim_user".to_string(),
            }],
            depends_on: vec![],
            from_date: None,
            initial_load: false,
        })
        .unwrap()
    }

    fn user_row(id: i64, name: &str, day: u32) -> TableRow {
        TableRow::new(vec![
            Cell::I64(id),
            Cell::String(name.to_string()),
            Cell::Date(chrono::NaiveDate::from_ymd_opt(2025, 1, day).unwrap()),
        ])
    }

    fn stream_row(id: i64, user_id: Cell, day: u32) -> TableRow {
        TableRow::new(vec![
            Cell::I64(id),
            user_id,
            Cell::Date(chrono::NaiveDate::from_ymd_opt(2025, 1, day).unwrap()),
        ])
    }

    #[tokio::test]
    async fn last_writer_wins_within_a_batch() {
        let warehouse = MemoryWarehouse::new();
        let merger = Merger::new(warehouse.clone());
        let plan = users_plan();

        let outcome = merger
            .apply(
                &plan,
                vec![
                    user_row(1, "old name", 1),
                    user_row(1, "new name", 2),
                    user_row(2, "other", 1),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.rows_applied, 2);
        assert_eq!(outcome.rows_superseded, 1);
        assert!(outcome.rejections.is_empty());

        let stored = warehouse
            .row(&plan.table, &RowKey::new(vec![Cell::I64(1)]))
            .await
            .unwrap();
        assert_eq!(stored.values()[1], Cell::String("new name".to_string()));
    }

    #[tokio::test]
    async fn existing_rows_are_replaced_wholesale() {
        let warehouse = MemoryWarehouse::new();
        let merger = Merger::new(warehouse.clone());
        let plan = users_plan();

        merger
            .apply(&plan, vec![user_row(1, "before", 1)])
            .await
            .unwrap();
        merger
            .apply(&plan, vec![user_row(1, "after", 2)])
            .await
            .unwrap();

        assert_eq!(warehouse.table_len(&plan.table).await, 1);
        let stored = warehouse
            .row(&plan.table, &RowKey::new(vec![Cell::I64(1)]))
            .await
            .unwrap();
        assert_eq!(stored.values()[1], Cell::String("after".to_string()));
    }

    #[tokio::test]
    async fn unresolved_references_are_rejected_not_fatal() {
        let warehouse = MemoryWarehouse::new();
        let merger = Merger::new(warehouse.clone());

        // Merge the referenced dimension row first.
        merger
            .apply(&users_plan(), vec![user_row(7, "listener", 1)])
            .await
            .unwrap();

        let plan = fact_plan();
        let outcome = merger
            .apply(
                &plan,
                vec![
                    stream_row(100, Cell::I64(7), 2),
                    stream_row(101, Cell::I64(999), 3),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.rows_applied, 1);
        assert_eq!(outcome.rejections.len(), 1);
        assert_eq!(
            outcome.rejections[0].reason,
            RejectReason::UnresolvedReference {
                column: "user_id".to_string(),
                table: TableName::new("analytics", "dim_user"),
            }
        );
        // The watermark candidate still covers the rejected row.
        assert_eq!(
            outcome.max_cdc_seen,
            Some(CdcValue::parse("2025-01-03").unwrap())
        );
    }

    #[tokio::test]
    async fn null_reference_is_rejected() {
        let warehouse = MemoryWarehouse::new();
        let merger = Merger::new(warehouse.clone());

        let plan = fact_plan();
        let outcome = merger
            .apply(&plan, vec![stream_row(100, Cell::Null, 2)])
            .await
            .unwrap();

        assert_eq!(outcome.rows_applied, 0);
        assert_eq!(outcome.rejections.len(), 1);
    }

    #[tokio::test]
    async fn malformed_rows_are_rejected() {
        let warehouse = MemoryWarehouse::new();
        let merger = Merger::new(warehouse.clone());
        let plan = users_plan();

        let outcome = merger
            .apply(
                &plan,
                vec![
                    TableRow::new(vec![Cell::I64(1)]),
                    TableRow::new(vec![
                        Cell::Null,
                        Cell::String("no key".to_string()),
                        Cell::Date(chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
                    ]),
                    TableRow::new(vec![
                        Cell::I64(2),
                        Cell::String("bad marker".to_string()),
                        Cell::String("not a date".to_string()),
                    ]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(outcome.rows_applied, 0);
        assert_eq!(outcome.rejections.len(), 3);
        assert_eq!(outcome.max_cdc_seen, None);
    }
}
