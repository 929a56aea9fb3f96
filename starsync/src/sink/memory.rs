use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SyncResult;
use crate::sink::base::{UpsertRow, WarehouseSink};
use crate::types::{RowKey, TableName, TableRow};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, HashMap<RowKey, TableRow>>,
    upsert_log: Vec<TableName>,
}

/// In-memory warehouse for testing and development.
///
/// [`MemoryWarehouse`] stores merged rows in memory and records the order in
/// which tables received upserts, which lets tests assert that fact tables are
/// never written before their dimensions. All data is lost when the process
/// terminates.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    /// Creates a new empty warehouse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all rows currently stored for a table.
    pub async fn table_rows(&self, table: &TableName) -> Vec<TableRow> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the stored row for a key, if present.
    pub async fn row(&self, table: &TableName, key: &RowKey) -> Option<TableRow> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table)
            .and_then(|rows| rows.get(key).cloned())
    }

    /// Returns the number of rows stored for a table.
    pub async fn table_len(&self, table: &TableName) -> usize {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(HashMap::len).unwrap_or(0)
    }

    /// Returns the tables in the order they received upsert batches.
    pub async fn upsert_log(&self) -> Vec<TableName> {
        let inner = self.inner.lock().await;
        inner.upsert_log.clone()
    }

    /// Clears all stored rows and the upsert log.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.tables.clear();
        inner.upsert_log.clear();
    }
}

impl WarehouseSink for MemoryWarehouse {
    async fn upsert_rows(&self, table: &TableName, rows: Vec<UpsertRow>) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;

        debug!(table = %table, rows = rows.len(), "applying upsert batch");

        inner.upsert_log.push(table.clone());

        let target = inner.tables.entry(table.clone()).or_default();
        for row in rows {
            target.insert(row.key, row.row);
        }

        Ok(())
    }

    async fn filter_existing(
        &self,
        table: &TableName,
        keys: Vec<RowKey>,
    ) -> SyncResult<HashSet<RowKey>> {
        let inner = self.inner.lock().await;

        let Some(rows) = inner.tables.get(table) else {
            return Ok(HashSet::new());
        };

        Ok(keys
            .into_iter()
            .filter(|key| rows.contains_key(key))
            .collect())
    }
}
