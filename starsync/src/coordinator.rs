//! The load coordinator drives one incremental cycle to completion.
//!
//! Tables are processed in dependency stages: all tables within a stage are
//! mutually independent and run in parallel (bounded by
//! `max_parallel_tables`), while a stage only starts after the previous one
//! fully finished — the barrier that keeps facts behind their dimensions. A
//! table's watermark advances only after its merge succeeded, and only past
//! the greatest CDC value seen in the cycle, so an interrupted table is always
//! safe to retry from the old watermark.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::StreamExt;
use starsync_config::shared::{LoaderConfig, TablesConfig};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::merge::{Merger, RowRejection};
use crate::ordering::stage_tables;
use crate::plan::TablePlan;
use crate::sink::base::WarehouseSink;
use crate::source::base::{ChangeSource, ChangeStream};
use crate::state::cycle::{CycleResult, TableReport, TableStatus};
use crate::state::watermark::WatermarkAdvance;
use crate::store::base::WatermarkStore;
use crate::sync_error;
use crate::types::{CdcValue, TableName, TableRow};

/// Coordinates incremental load cycles for one table set.
///
/// A coordinator owns exactly one table set; a run-lock refuses overlapping
/// cycles, since concurrent advances to the same watermarks would race. The
/// coordinator is cheap to clone and share behind the generic source, sink,
/// and store handles.
#[derive(Debug)]
pub struct LoadCoordinator<Src, Snk, Sto> {
    config: Arc<LoaderConfig>,
    source: Src,
    sink: Snk,
    store: Sto,
    run_lock: Arc<Mutex<()>>,
    shutdown_tx: ShutdownTx,
}

impl<Src, Snk, Sto> LoadCoordinator<Src, Snk, Sto>
where
    Src: ChangeSource + Clone + Send + Sync + 'static,
    Snk: WarehouseSink + Clone + Send + Sync + 'static,
    Sto: WatermarkStore + Clone + Send + Sync + 'static,
{
    /// Creates a coordinator over the given source, sink, and watermark store.
    pub fn new(config: LoaderConfig, source: Src, sink: Snk, store: Sto) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            source,
            sink,
            store,
            run_lock: Arc::new(Mutex::new(())),
            shutdown_tx,
        }
    }

    /// Returns a handle used to cancel an in-flight cycle.
    ///
    /// Cancellation is cooperative: it is honored between tables, never inside
    /// a started merge, so a cancelled cycle leaves no half-applied batch
    /// under an advanced watermark.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Runs one incremental cycle over the configured tables.
    ///
    /// Row- and table-level failures are reported inside the returned
    /// [`CycleResult`]; the only errors escaping this method are configuration
    /// errors detected before any table is processed, and the refusal to
    /// overlap an already-running cycle.
    pub async fn run_cycle(&self, tables: &TablesConfig) -> SyncResult<CycleResult> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            bail!(
                ErrorKind::CycleAlreadyRunning,
                "A cycle is already running for this table set",
                "Overlapping cycles would race on watermark advancement; retry after the in-flight cycle completes"
            );
        };

        let started_at = Utc::now();
        let cycle_start = Instant::now();

        self.config.validate()?;
        tables.validate()?;

        let plans = tables
            .tables
            .iter()
            .map(TablePlan::resolve)
            .collect::<SyncResult<Vec<_>>>()?;
        let stages = stage_tables(&plans)?;

        info!(
            tables = plans.len(),
            stages = stages.len(),
            "starting incremental load cycle"
        );

        let shutdown_rx = self.shutdown_tx.subscribe();
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_tables as usize));

        let mut reports: HashMap<usize, TableReport> = HashMap::with_capacity(plans.len());
        let mut not_completed: HashSet<TableName> = HashSet::new();
        let mut cancelled = false;

        for stage in stages {
            let mut join_set: JoinSet<(usize, TableReport)> = JoinSet::new();

            for idx in stage {
                let plan = &plans[idx];

                // Cooperative cancellation check at the table boundary.
                if cancelled || shutdown_rx.is_signaled() {
                    cancelled = true;
                    reports.insert(
                        idx,
                        TableReport {
                            table: plan.table.clone(),
                            elapsed_ms: 0,
                            status: TableStatus::Cancelled,
                        },
                    );
                    not_completed.insert(plan.table.clone());
                    continue;
                }

                // A table whose prerequisite did not complete is skipped: its
                // dimension rows may be incomplete and its fact rows would be
                // rejected wholesale.
                if let Some(blocker) = plan
                    .dependencies
                    .iter()
                    .find(|dependency| not_completed.contains(*dependency))
                {
                    debug!(table = %plan.table, blocked_on = %blocker, "skipping dependent table");
                    reports.insert(
                        idx,
                        TableReport {
                            table: plan.table.clone(),
                            elapsed_ms: 0,
                            status: TableStatus::Skipped {
                                blocked_on: blocker.clone(),
                            },
                        },
                    );
                    not_completed.insert(plan.table.clone());
                    continue;
                }

                let table = plan.table.clone();
                let worker = process_table(
                    self.config.clone(),
                    plan.clone(),
                    self.source.clone(),
                    self.sink.clone(),
                    self.store.clone(),
                    permits.clone(),
                );

                join_set.spawn(async move {
                    let report = AssertUnwindSafe(worker)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| TableReport {
                            table: table.clone(),
                            elapsed_ms: 0,
                            status: TableStatus::Failed {
                                kind: format!("{:?}", ErrorKind::TableWorkerPanic),
                                error: "table worker panicked".to_string(),
                            },
                        });

                    (idx, report)
                });
            }

            // Barrier: the next stage only starts once every table of this
            // stage finished, so dependents always observe fully merged
            // prerequisites.
            while let Some(joined) = join_set.join_next().await {
                if let Ok((idx, report)) = joined {
                    if !report.is_completed() {
                        not_completed.insert(report.table.clone());
                    }
                    reports.insert(idx, report);
                }
            }
        }

        let mut tables_in_order: Vec<TableReport> = Vec::with_capacity(plans.len());
        for idx in 0..plans.len() {
            if let Some(report) = reports.remove(&idx) {
                tables_in_order.push(report);
            }
        }

        let result = CycleResult {
            started_at,
            elapsed_ms: cycle_start.elapsed().as_millis() as u64,
            tables: tables_in_order,
        };

        info!(
            elapsed_ms = result.elapsed_ms,
            rows_applied = result.rows_applied(),
            failures = result.has_failures(),
            "incremental load cycle finished"
        );

        Ok(result)
    }
}

/// Accumulated per-table statistics for the cycle report.
#[derive(Debug, Default)]
struct TableStats {
    rows_applied: usize,
    rows_superseded: usize,
    rejections: Vec<RowRejection>,
    new_watermark: Option<CdcValue>,
}

/// Processes one table end to end and renders its report.
async fn process_table<Src, Snk, Sto>(
    config: Arc<LoaderConfig>,
    plan: TablePlan,
    source: Src,
    sink: Snk,
    store: Sto,
    permits: Arc<Semaphore>,
) -> TableReport
where
    Src: ChangeSource + Send + Sync,
    Snk: WarehouseSink + Clone + Send + Sync,
    Sto: WatermarkStore + Send + Sync,
{
    let _permit = permits
        .acquire_owned()
        .await
        .expect("table permits semaphore is never closed");

    let started = Instant::now();
    let result = load_table(&config, &plan, &source, &sink, &store).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(stats) => {
            info!(
                table = %plan.table,
                rows_applied = stats.rows_applied,
                rejected = stats.rejections.len(),
                elapsed_ms,
                "table merge completed"
            );

            TableReport {
                table: plan.table,
                elapsed_ms,
                status: TableStatus::Completed {
                    rows_applied: stats.rows_applied,
                    rows_superseded: stats.rows_superseded,
                    rejections: stats.rejections,
                    new_watermark: stats.new_watermark,
                },
            }
        }
        Err(err) => {
            warn!(table = %plan.table, error = %err, "table merge failed, watermark unchanged");

            TableReport {
                table: plan.table,
                elapsed_ms,
                status: TableStatus::Failed {
                    kind: format!("{:?}", err.kind()),
                    error: err.to_string(),
                },
            }
        }
    }
}

/// Selects, merges, and advances the watermark for one table.
async fn load_table<Src, Snk, Sto>(
    config: &LoaderConfig,
    plan: &TablePlan,
    source: &Src,
    sink: &Snk,
    store: &Sto,
) -> SyncResult<TableStats>
where
    Src: ChangeSource + Send + Sync,
    Snk: WarehouseSink + Clone + Send + Sync,
    Sto: WatermarkStore + Send + Sync,
{
    let step_timeout = Duration::from_millis(config.step_timeout_ms);

    // An explicit initial-load request ignores any stored watermark; otherwise
    // the stored value wins over the configured seed.
    let since = if plan.config.initial_load {
        None
    } else {
        match store.get_watermark(&plan.table).await? {
            Some(watermark) => Some(watermark.cdc),
            None => plan.seed.clone(),
        }
    };

    match &since {
        Some(since) => debug!(table = %plan.table, since = %since, "selecting changed rows"),
        None => debug!(table = %plan.table, "selecting all rows, no watermark present"),
    }

    let mut stream = step(
        step_timeout,
        "change selection",
        source.fetch_changes(&plan.config, since.as_ref()),
    )
    .await?;

    let merger = Merger::new(sink.clone());
    let mut stats = TableStats::default();
    let mut max_cdc: Option<CdcValue> = None;

    // Selection and merge are pipelined in batches to bound memory, but the
    // watermark only moves after the entire change set is applied.
    loop {
        let batch = step(
            step_timeout,
            "change stream read",
            collect_batch(&mut stream, config.batch.max_size),
        )
        .await?;

        if batch.is_empty() {
            break;
        }

        let outcome = step(step_timeout, "merge application", merger.apply(plan, batch)).await?;

        stats.rows_applied += outcome.rows_applied;
        stats.rows_superseded += outcome.rows_superseded;
        stats.rejections.extend(outcome.rejections);

        if let Some(cdc) = outcome.max_cdc_seen {
            match &max_cdc {
                Some(current) if !cdc.is_after(current) => {}
                _ => max_cdc = Some(cdc),
            }
        }
    }

    if let Some(candidate) = max_cdc {
        match store.advance_watermark(&plan.table, candidate).await? {
            WatermarkAdvance::Advanced(watermark) => {
                stats.new_watermark = Some(watermark.cdc);
            }
            // The store has already logged the refusal; the report shows an
            // unchanged watermark.
            WatermarkAdvance::Regressed { .. } => {}
        }
    }

    Ok(stats)
}

/// Collects up to `max` rows from the change stream.
async fn collect_batch(stream: &mut ChangeStream, max: usize) -> SyncResult<Vec<TableRow>> {
    let mut rows = Vec::new();

    while rows.len() < max {
        match stream.next().await {
            Some(row) => rows.push(row?),
            None => break,
        }
    }

    Ok(rows)
}

/// Applies the per-step timeout, mapping expiry to an infrastructure failure.
async fn step<T>(
    timeout: Duration,
    what: &'static str,
    fut: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(step_timeout_error(what, timeout)),
    }
}

fn step_timeout_error(what: &'static str, timeout: Duration) -> SyncError {
    sync_error!(
        ErrorKind::StepTimedOut,
        "Step timed out",
        format!("{what} exceeded the configured {}ms timeout", timeout.as_millis())
    )
}
