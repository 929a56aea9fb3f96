//! Pre-flight resolution of table configurations.
//!
//! Before a cycle touches any data, every [`TableConfig`] is resolved into a
//! [`TablePlan`]: column names become positions, reference targets and
//! dependency entries become [`TableName`]s, and the optional seed watermark is
//! parsed. Any problem found here is a configuration error that aborts the
//! cycle before a single table is processed.

use starsync_config::shared::TableConfig;

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;
use crate::types::{CdcValue, TableName};

/// A reference column resolved to its position and target table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReference {
    /// Name of the referencing column.
    pub column: String,
    /// Position of the referencing column in the row layout.
    pub column_idx: usize,
    /// The referenced table.
    pub table: TableName,
}

/// A table configuration resolved for one cycle.
///
/// Immutable once built; owned by the coordinator for the duration of the
/// cycle.
#[derive(Debug, Clone)]
pub struct TablePlan {
    /// The originating configuration, kept for change selection.
    pub config: TableConfig,
    /// Schema-qualified table identity.
    pub table: TableName,
    /// Position of the CDC column in the row layout.
    pub cdc_idx: usize,
    /// Positions of the primary key columns in the row layout.
    pub key_indices: Vec<usize>,
    /// References validated at merge time.
    pub references: Vec<ResolvedReference>,
    /// Every table that must complete before this one starts: reference
    /// targets first, then validation-only `depends_on` entries, deduplicated.
    pub dependencies: Vec<TableName>,
    /// Seed watermark used when the store has none for this table.
    pub seed: Option<CdcValue>,
}

impl TablePlan {
    /// Resolves a table configuration, validating it in the process.
    pub fn resolve(config: &TableConfig) -> SyncResult<TablePlan> {
        config.validate()?;

        let table = TableName::from(config);

        // validate() guarantees every name below is present in the column list
        // and every qualified name parses.
        let position = |column: &str| {
            config
                .columns
                .iter()
                .position(|candidate| candidate == column)
                .ok_or_else(|| {
                    sync_error!(
                        ErrorKind::ConfigError,
                        "Column not found in table columns",
                        format!("Column `{column}` is not declared by `{table}`")
                    )
                })
        };

        let cdc_idx = position(&config.cdc_column)?;

        let mut key_indices = Vec::with_capacity(config.primary_key.len());
        for column in &config.primary_key {
            key_indices.push(position(column)?);
        }

        let mut references = Vec::with_capacity(config.references.len());
        let mut dependencies: Vec<TableName> = Vec::new();
        for reference in &config.references {
            let referenced = parse_dependency(&table, &reference.table)?;

            references.push(ResolvedReference {
                column: reference.column.clone(),
                column_idx: position(&reference.column)?,
                table: referenced.clone(),
            });

            if !dependencies.contains(&referenced) {
                dependencies.push(referenced);
            }
        }

        for dependency in &config.depends_on {
            let dependency = parse_dependency(&table, dependency)?;
            if !dependencies.contains(&dependency) {
                dependencies.push(dependency);
            }
        }

        let seed = match &config.from_date {
            Some(text) => Some(CdcValue::parse(text).map_err(|err| {
                sync_error!(
                    ErrorKind::ConfigError,
                    "Seed watermark is not a valid change marker",
                    format!("`from_date` of `{table}` does not parse: {err}")
                )
            })?),
            None => None,
        };

        Ok(TablePlan {
            config: config.clone(),
            table,
            cdc_idx,
            key_indices,
            references,
            dependencies,
            seed,
        })
    }
}

fn parse_dependency(table: &TableName, qualified: &str) -> SyncResult<TableName> {
    TableName::parse(qualified).ok_or_else(|| {
        sync_error!(
            ErrorKind::ConfigError,
            "Dependency is not a qualified table name",
            format!("`{table}` declares dependency `{qualified}`, expected `schema.table`")
        )
    })
}

#[cfg(test)]
mod tests {
    use starsync_config::shared::TableReference;

    use super::*;

    fn fact_config() -> TableConfig {
        TableConfig {
            schema: "analytics".to_string(),
            table: "fact_stream".to_string(),
            columns: vec![
                "stream_id".to_string(),
                "user_id".to_string(),
                "played_at".to_string(),
            ],
            cdc_column: "played_at".to_string(),
            primary_key: vec!["stream_id".to_string()],
            references: vec![TableReference {
                column: "user_id".to_string(),
                table: "analytics.dim_user".to_string(),
            }],
            depends_on: vec!["analytics.dim_date".to_string()],
            from_date: None,
            initial_load: false,
        }
    }

    #[test]
    fn resolves_positions_and_dependencies() {
        let plan = TablePlan::resolve(&fact_config()).unwrap();

        assert_eq!(plan.cdc_idx, 2);
        assert_eq!(plan.key_indices, vec![0]);
        assert_eq!(plan.references.len(), 1);
        assert_eq!(plan.references[0].column_idx, 1);
        assert_eq!(
            plan.dependencies,
            vec![
                TableName::new("analytics", "dim_user"),
                TableName::new("analytics", "dim_date"),
            ]
        );
    }

    #[test]
    fn invalid_seed_watermark_is_a_config_error() {
        let mut config = fact_config();
        config.from_date = Some("not-a-date".to_string());

        let err = TablePlan::resolve(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn unknown_cdc_column_is_a_config_error() {
        let mut config = fact_config();
        config.cdc_column = "missing".to_string();

        let err = TablePlan::resolve(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
