use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use starsync_config::shared::TableConfig;
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::source::base::{ChangeSource, ChangeStream};
use crate::types::{CdcValue, TableName, TableRow};

/// In-memory change source for testing and development.
///
/// [`MemoryChangeSource`] serves rows from per-table fixtures. Selection
/// filters on the configured CDC column with the strict `>` predicate and
/// returns rows sorted ascending by their CDC value, matching the contract a
/// real source implements with an indexed range scan. Rows whose CDC cell is
/// null or non-comparable sort first and are only selected on initial load.
#[derive(Debug, Clone, Default)]
pub struct MemoryChangeSource {
    inner: Arc<Mutex<HashMap<TableName, Vec<TableRow>>>>,
}

impl MemoryChangeSource {
    /// Creates a new empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends rows to a table's fixture.
    pub async fn add_rows(&self, table: &TableName, rows: Vec<TableRow>) {
        let mut inner = self.inner.lock().await;
        inner.entry(table.clone()).or_default().extend(rows);
    }

    /// Replaces a table's fixture entirely.
    pub async fn replace_rows(&self, table: &TableName, rows: Vec<TableRow>) {
        let mut inner = self.inner.lock().await;
        inner.insert(table.clone(), rows);
    }

    /// Removes all fixtures.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.clear();
    }
}

impl ChangeSource for MemoryChangeSource {
    async fn fetch_changes(
        &self,
        table: &TableConfig,
        since: Option<&CdcValue>,
    ) -> SyncResult<ChangeStream> {
        let Some(cdc_idx) = table
            .columns
            .iter()
            .position(|column| column == &table.cdc_column)
        else {
            bail!(
                ErrorKind::SourceQueryFailed,
                "CDC column not found in table columns",
                format!(
                    "Column `{}` is not part of the declared columns of `{}`",
                    table.cdc_column,
                    table.qualified_name()
                )
            );
        };

        let table_name = TableName::from(table);
        let inner = self.inner.lock().await;
        let rows = inner.get(&table_name).cloned().unwrap_or_default();
        drop(inner);

        let mut selected: Vec<(Option<CdcValue>, TableRow)> = rows
            .into_iter()
            .map(|row| {
                let cdc = row.values().get(cdc_idx).and_then(CdcValue::from_cell);
                (cdc, row)
            })
            .filter(|(cdc, _)| match (since, cdc) {
                // No watermark selects everything, including rows without a
                // usable change marker.
                (None, _) => true,
                // The strict predicate excludes the boundary row and anything
                // that cannot compare against the watermark.
                (Some(since), Some(cdc)) => cdc.is_after(since),
                (Some(_), None) => false,
            })
            .collect();

        selected.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let stream: ChangeStream =
            stream::iter(selected.into_iter().map(|(_, row)| Ok(row))).boxed();

        Ok(stream)
    }
}
