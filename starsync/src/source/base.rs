use std::future::Future;

use futures::stream::BoxStream;
use starsync_config::shared::TableConfig;

use crate::error::SyncResult;
use crate::types::{CdcValue, TableRow};

/// A finite stream of changed rows for one table, ordered ascending by the
/// table's CDC column.
pub type ChangeStream = BoxStream<'static, SyncResult<TableRow>>;

/// Trait for systems the loader selects changed rows from.
///
/// [`ChangeSource`] implementations produce the set of rows whose CDC column is
/// strictly greater than the given marker; when `since` is `None` the whole
/// table is selected (initial load). The ascending CDC order lets the merger
/// compute the new watermark from the last row seen, and means a crash
/// mid-stream leaves the watermark unadvanced so the unfinished batch is fully
/// retried from the old marker — delivery into the merge is at-least-once.
///
/// Every call re-issues the selection from scratch; a stream is never resumed
/// across calls.
pub trait ChangeSource {
    /// Selects the rows of `table` changed since `since`.
    fn fetch_changes(
        &self,
        table: &TableConfig,
        since: Option<&CdcValue>,
    ) -> impl Future<Output = SyncResult<ChangeStream>> + Send;
}
