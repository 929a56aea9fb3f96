use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, ValidationError};

/// Configuration for a load coordinator.
///
/// Contains the settings that shape one incremental cycle: batching, per-step
/// timeouts, and the parallelism bound for independent tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoaderConfig {
    /// Batch processing configuration.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Timeout, in milliseconds, applied independently to each change selection
    /// and each merge batch. A step that exceeds it is treated as an
    /// infrastructure failure for its table.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Maximum number of independent tables processed concurrently within a
    /// dependency stage.
    #[serde(default = "default_max_parallel_tables")]
    pub max_parallel_tables: u16,
}

impl LoaderConfig {
    /// Default per-step timeout in milliseconds.
    pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

    /// Default number of tables processed in parallel.
    pub const DEFAULT_MAX_PARALLEL_TABLES: u16 = 4;

    /// Validates loader configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;

        if self.step_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "step_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_parallel_tables == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "max_parallel_tables".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            step_timeout_ms: default_step_timeout_ms(),
            max_parallel_tables: default_max_parallel_tables(),
        }
    }
}

fn default_step_timeout_ms() -> u64 {
    LoaderConfig::DEFAULT_STEP_TIMEOUT_MS
}

fn default_max_parallel_tables() -> u16 {
    LoaderConfig::DEFAULT_MAX_PARALLEL_TABLES
}
