use std::future::Future;

use crate::error::SyncResult;
use crate::state::watermark::{Watermark, WatermarkAdvance};
use crate::types::{CdcValue, TableName};

/// Trait for storing and retrieving per-table watermarks.
///
/// Implementations must uphold two invariants:
///
/// - **Monotonicity**: `advance_watermark` replaces the stored value only when
///   the candidate is strictly greater (or no value is stored). A refused
///   advancement is reported as [`WatermarkAdvance::Regressed`], logged, and
///   must leave the store untouched; it is never an error.
/// - **Write-after-commit**: callers advance only after the corresponding
///   merge fully succeeded. A crash between merge and advance is safe because
///   the merge is idempotent under re-application of the same change set.
///
/// Implementations should ensure thread-safety and handle concurrent access.
pub trait WatermarkStore {
    /// Loads watermarks from the persistent backend into the cache.
    ///
    /// Called once at startup; returns the number of watermarks loaded. All
    /// other methods operate on the cache and, where applicable, write through
    /// to the backend.
    fn load_watermarks(&self) -> impl Future<Output = SyncResult<usize>> + Send;

    /// Returns the watermark for a table, or `None` when the table has never
    /// completed a load (or was explicitly reset).
    fn get_watermark(
        &self,
        table: &TableName,
    ) -> impl Future<Output = SyncResult<Option<Watermark>>> + Send;

    /// Atomically replaces the stored watermark when `value` is strictly
    /// greater than the stored one, or when no watermark exists yet.
    fn advance_watermark(
        &self,
        table: &TableName,
        value: CdcValue,
    ) -> impl Future<Output = SyncResult<WatermarkAdvance>> + Send;

    /// Clears the watermark for a table, forcing a full reload next cycle.
    fn reset_watermark(&self, table: &TableName) -> impl Future<Output = SyncResult<()>> + Send;
}
