use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::SyncResult;
use crate::state::watermark::{Watermark, WatermarkAdvance};
use crate::store::base::WatermarkStore;
use crate::types::{CdcValue, TableName};

/// In-memory watermark storage.
///
/// [`MemoryWatermarkStore`] keeps all watermarks in memory, which makes it
/// ideal for tests and development. Everything is lost on process restart, so
/// every cycle after a restart behaves like an initial load.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatermarkStore {
    inner: Arc<Mutex<BTreeMap<TableName, Watermark>>>,
}

impl MemoryWatermarkStore {
    /// Creates a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    async fn load_watermarks(&self) -> SyncResult<usize> {
        let inner = self.inner.lock().await;

        Ok(inner.len())
    }

    async fn get_watermark(&self, table: &TableName) -> SyncResult<Option<Watermark>> {
        let inner = self.inner.lock().await;

        Ok(inner.get(table).cloned())
    }

    async fn advance_watermark(
        &self,
        table: &TableName,
        value: CdcValue,
    ) -> SyncResult<WatermarkAdvance> {
        let mut inner = self.inner.lock().await;

        if let Some(stored) = inner.get(table)
            && !stored.accepts(&value)
        {
            warn!(
                table = %table,
                stored = %stored.cdc,
                attempted = %value,
                "refusing watermark regression"
            );

            return Ok(WatermarkAdvance::Regressed {
                stored: stored.cdc.clone(),
                attempted: value,
            });
        }

        let watermark = Watermark::new(value);
        inner.insert(table.clone(), watermark.clone());

        Ok(WatermarkAdvance::Advanced(watermark))
    }

    async fn reset_watermark(&self, table: &TableName) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        inner.remove(table);

        Ok(())
    }
}
