//! Sink wrappers for failure injection and slowdowns in tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, SyncResult};
use crate::sink::base::{UpsertRow, WarehouseSink};
use crate::sync_error;
use crate::types::{RowKey, TableName};

/// Wraps a sink and fails upserts for selected tables.
///
/// Used to simulate infrastructure failures (connectivity loss) scoped to a
/// single table, leaving the rest of the cycle untouched.
#[derive(Debug, Clone)]
pub struct FaultySink<S> {
    inner: S,
    failing: Arc<Mutex<HashSet<TableName>>>,
}

impl<S> FaultySink<S> {
    /// Wraps a sink with no failures configured.
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Makes every upsert against `table` fail until cleared.
    pub async fn fail_upserts_for(&self, table: &TableName) {
        let mut failing = self.failing.lock().await;
        failing.insert(table.clone());
    }

    /// Clears all configured failures.
    pub async fn clear_failures(&self) {
        let mut failing = self.failing.lock().await;
        failing.clear();
    }
}

impl<S> WarehouseSink for FaultySink<S>
where
    S: WarehouseSink + Send + Sync,
{
    async fn upsert_rows(&self, table: &TableName, rows: Vec<UpsertRow>) -> SyncResult<()> {
        let failing = self.failing.lock().await;
        if failing.contains(table) {
            return Err(sync_error!(
                ErrorKind::DestinationConnectionFailed,
                "Injected warehouse failure",
                format!("upserts against `{table}` are configured to fail")
            ));
        }
        drop(failing);

        self.inner.upsert_rows(table, rows).await
    }

    async fn filter_existing(
        &self,
        table: &TableName,
        keys: Vec<RowKey>,
    ) -> SyncResult<HashSet<RowKey>> {
        self.inner.filter_existing(table, keys).await
    }
}

/// Wraps a sink and delays every upsert by a fixed duration.
///
/// Used to keep a cycle in flight long enough to observe run-lock refusals and
/// timeouts.
#[derive(Debug, Clone)]
pub struct DelayedSink<S> {
    inner: S,
    delay: Duration,
}

impl<S> DelayedSink<S> {
    /// Wraps a sink, delaying each upsert batch by `delay`.
    pub fn wrap(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<S> WarehouseSink for DelayedSink<S>
where
    S: WarehouseSink + Send + Sync,
{
    async fn upsert_rows(&self, table: &TableName, rows: Vec<UpsertRow>) -> SyncResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert_rows(table, rows).await
    }

    async fn filter_existing(
        &self,
        table: &TableName,
        keys: Vec<RowKey>,
    ) -> SyncResult<HashSet<RowKey>> {
        self.inner.filter_existing(table, keys).await
    }
}
