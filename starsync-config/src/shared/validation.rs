use thiserror::Error;

/// Errors raised while validating configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field holds a value outside its accepted range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: String,
        constraint: String,
    },

    /// The configured table set is empty.
    #[error("at least one table must be configured")]
    NoTablesConfigured,

    /// A table names a column that is not part of its declared column list.
    #[error("table `{table}` refers to unknown column `{column}` in `{field}`")]
    UnknownColumn {
        table: String,
        column: String,
        field: String,
    },

    /// A table declares the same column more than once.
    #[error("table `{table}` declares duplicate column `{column}`")]
    DuplicateColumn { table: String, column: String },

    /// Two tables share the same schema-qualified name.
    #[error("table `{table}` is configured more than once")]
    DuplicateTable { table: String },

    /// A dependency entry is not a `schema.table` qualified name.
    #[error("table `{table}` declares malformed dependency `{dependency}`, expected `schema.table`")]
    MalformedDependency { table: String, dependency: String },
}
