use std::collections::HashSet;
use std::future::Future;

use crate::error::SyncResult;
use crate::types::{RowKey, TableName, TableRow};

/// A row destined for the warehouse, paired with its upsert matching key.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertRow {
    /// Primary key the upsert matches on.
    pub key: RowKey,
    /// The full replacement row.
    pub row: TableRow,
}

/// Trait for warehouses that receive merged rows.
///
/// [`WarehouseSink`] implementations apply upserts keyed by primary key: an
/// existing row is replaced wholesale (full row replace, not a partial patch),
/// an absent key is inserted. Upserts must be idempotent since the loader
/// retries a table's whole change set after an infrastructure failure.
///
/// The schemas of the target tables are assumed to pre-exist; the loader never
/// creates or migrates them.
pub trait WarehouseSink {
    /// Applies a batch of upserts to a table.
    fn upsert_rows(
        &self,
        table: &TableName,
        rows: Vec<UpsertRow>,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Returns the subset of `keys` that exist in `table`.
    ///
    /// Used by the merger to validate that fact rows only reference dimension
    /// rows that are present after the dimensions merged.
    fn filter_existing(
        &self,
        table: &TableName,
        keys: Vec<RowKey>,
    ) -> impl Future<Output = SyncResult<HashSet<RowKey>>> + Send;
}
