use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SyncResult;
use crate::state::watermark::{Watermark, WatermarkAdvance};
use crate::store::base::WatermarkStore;
use crate::types::{CdcValue, TableName};

/// File-backed watermark storage.
///
/// Watermarks are persisted as a pretty-printed JSON mapping of `schema.table`
/// to `{cdc, last_success_at}`, so an operator can replay a table by editing
/// its entry or force a full reload by deleting it. The file is rewritten on
/// every advance or reset; writes go to a temporary sibling first and are
/// renamed into place, so a crash mid-write never corrupts the stored state.
///
/// An absent file is treated as an empty store, which is what a fresh
/// deployment looks like.
#[derive(Debug, Clone)]
pub struct JsonWatermarkStore {
    path: PathBuf,
    inner: Arc<Mutex<BTreeMap<TableName, Watermark>>>,
}

impl JsonWatermarkStore {
    /// Creates a store backed by the given file path.
    ///
    /// Nothing is read until [`WatermarkStore::load_watermarks`] is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the cache and atomically replaces the backing file.
    async fn persist(&self, watermarks: &BTreeMap<TableName, Watermark>) -> SyncResult<()> {
        let rendered = serde_json::to_vec_pretty(watermarks)?;

        let mut tmp_path = self.path.clone();
        tmp_path.as_mut_os_string().push(".tmp");

        tokio::fs::write(&tmp_path, rendered).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        Ok(())
    }
}

impl WatermarkStore for JsonWatermarkStore {
    async fn load_watermarks(&self) -> SyncResult<usize> {
        let mut inner = self.inner.lock().await;

        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "watermark file not found, starting empty");

                inner.clear();
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        let watermarks: BTreeMap<TableName, Watermark> = serde_json::from_slice(&contents)?;
        let loaded = watermarks.len();
        *inner = watermarks;

        Ok(loaded)
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
        self.persist(&inner).await?;

        Ok(WatermarkAdvance::Advanced(watermark))
    }

    async fn reset_watermark(&self, table: &TableName) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.remove(table).is_some() {
            self.persist(&inner).await?;
        }

        Ok(())
    }
}
