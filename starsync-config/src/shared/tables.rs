use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// A foreign-key style reference from one configured table to another.
///
/// The referencing column must hold the primary key value of a row in the
/// referenced table. References are validated at merge time and also imply a
/// processing-order dependency on the referenced table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TableReference {
    /// Column of this table holding the referenced key.
    pub column: String,
    /// Schema-qualified name (`schema.table`) of the referenced table.
    pub table: String,
}

/// Configuration for a single source table tracked by the loader.
///
/// The column list declares the layout of the rows produced by the change
/// source, so the engine can resolve the CDC column, the primary key, and any
/// reference columns to positions before a cycle starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableConfig {
    /// Schema the table lives in.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Ordered column names of the rows produced for this table.
    pub columns: Vec<String>,
    /// Column used to detect changed rows.
    pub cdc_column: String,
    /// Primary key column(s), used for upsert matching.
    pub primary_key: Vec<String>,
    /// References to other configured tables, validated at merge time.
    #[serde(default)]
    pub references: Vec<TableReference>,
    /// Additional processing-order dependencies (`schema.table`) that carry no
    /// merge-time key validation.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Seed watermark applied when the store holds none for this table,
    /// as an ISO-8601 date or timestamp.
    #[serde(default)]
    pub from_date: Option<String>,
    /// When set, selection ignores any stored watermark and reloads the whole
    /// table on the next cycle.
    #[serde(default)]
    pub initial_load: bool,
}

impl TableConfig {
    /// Returns the schema-qualified `schema.table` name.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Validates this table's configuration in isolation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let table = self.qualified_name();

        if self.columns.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("{table}.columns"),
                constraint: "must declare at least one column".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(ValidationError::DuplicateColumn {
                    table,
                    column: column.clone(),
                });
            }
        }

        if !seen.contains(self.cdc_column.as_str()) {
            return Err(ValidationError::UnknownColumn {
                table,
                column: self.cdc_column.clone(),
                field: "cdc_column".to_string(),
            });
        }

        if self.primary_key.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: format!("{table}.primary_key"),
                constraint: "must declare at least one column".to_string(),
            });
        }

        for column in &self.primary_key {
            if !seen.contains(column.as_str()) {
                return Err(ValidationError::UnknownColumn {
                    table,
                    column: column.clone(),
                    field: "primary_key".to_string(),
                });
            }
        }

        for reference in &self.references {
            if !seen.contains(reference.column.as_str()) {
                return Err(ValidationError::UnknownColumn {
                    table,
                    column: reference.column.clone(),
                    field: "references".to_string(),
                });
            }

            validate_qualified_name(&table, &reference.table)?;
        }

        for dependency in &self.depends_on {
            validate_qualified_name(&table, dependency)?;
        }

        Ok(())
    }
}

/// The full set of tables driven by one load coordinator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TablesConfig {
    /// Tables in configuration order. Ties among independent tables are broken
    /// by their position in this list.
    pub tables: Vec<TableConfig>,
}

impl TablesConfig {
    /// Validates every table and the set as a whole.
    ///
    /// Dependency resolution against the configured set happens in the engine,
    /// which owns the dependency graph; this only checks shape.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::NoTablesConfigured);
        }

        let mut names = HashSet::new();
        for table in &self.tables {
            table.validate()?;

            if !names.insert(table.qualified_name()) {
                return Err(ValidationError::DuplicateTable {
                    table: table.qualified_name(),
                });
            }
        }

        Ok(())
    }
}

/// Checks that a dependency entry looks like `schema.table`.
fn validate_qualified_name(table: &str, dependency: &str) -> Result<(), ValidationError> {
    let mut parts = dependency.splitn(2, '.');
    let schema = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();

    if schema.is_empty() || name.is_empty() {
        return Err(ValidationError::MalformedDependency {
            table: table.to_string(),
            dependency: dependency.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> TableConfig {
        TableConfig {
            schema: "analytics".to_string(),
            table: "dim_user".to_string(),
            columns: vec![
                "user_id".to_string(),
                "user_name".to_string(),
                "updated_at".to_string(),
            ],
            cdc_column: "updated_at".to_string(),
            primary_key: vec!["user_id".to_string()],
            references: vec![],
            depends_on: vec![],
            from_date: None,
            initial_load: false,
        }
    }

    #[test]
    fn valid_table_passes_validation() {
        assert!(users_table().validate().is_ok());
    }

    #[test]
    fn unknown_cdc_column_is_rejected() {
        let mut table = users_table();
        table.cdc_column = "modified_at".to_string();

        assert!(matches!(
            table.validate(),
            Err(ValidationError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn empty_primary_key_is_rejected() {
        let mut table = users_table();
        table.primary_key.clear();

        assert!(matches!(
            table.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn unqualified_dependency_is_rejected() {
        let mut table = users_table();
        table.depends_on.push("dim_artist".to_string());

        assert!(matches!(
            table.validate(),
            Err(ValidationError::MalformedDependency { .. })
        ));
    }

    #[test]
    fn deserializes_with_optional_fields_defaulted() {
        let config: TablesConfig = serde_json::from_value(serde_json::json!({
            "tables": [{
                "schema": "analytics",
                "table": "dim_user",
                "columns": ["user_id", "user_name", "updated_at"],
                "cdc_column": "updated_at",
                "primary_key": ["user_id"],
                "from_date": "2025-01-01"
            }]
        }))
        .unwrap();

        assert!(config.validate().is_ok());
        let table = &config.tables[0];
        assert_eq!(table.from_date.as_deref(), Some("2025-01-01"));
        assert!(table.references.is_empty());
        assert!(table.depends_on.is_empty());
        assert!(!table.initial_load);
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let config = TablesConfig {
            tables: vec![users_table(), users_table()],
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateTable { .. })
        ));
    }
}
