use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use starsync_config::shared::TableConfig;

/// Schema-qualified identity of a warehouse table.
///
/// Serialized as the `schema.table` string, which is also the key format used
/// by the watermark store file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parses a `schema.table` qualified name.
    ///
    /// Returns `None` when either part is missing or empty.
    pub fn parse(qualified: &str) -> Option<Self> {
        let (schema, name) = qualified.split_once('.')?;
        if schema.is_empty() || name.is_empty() {
            return None;
        }

        Some(Self::new(schema, name))
    }
}

impl From<&TableConfig> for TableName {
    fn from(config: &TableConfig) -> Self {
        Self::new(config.schema.clone(), config.table.clone())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl Serialize for TableName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TableName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let qualified = String::deserialize(deserializer)?;
        TableName::parse(&qualified).ok_or_else(|| {
            de::Error::custom(format!(
                "expected a `schema.table` qualified name, got `{qualified}`"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_names() {
        let table = TableName::parse("analytics.dim_user").unwrap();
        assert_eq!(table.schema, "analytics");
        assert_eq!(table.name, "dim_user");
    }

    #[test]
    fn rejects_unqualified_names() {
        assert!(TableName::parse("dim_user").is_none());
        assert!(TableName::parse(".dim_user").is_none());
        assert!(TableName::parse("analytics.").is_none());
    }

    #[test]
    fn serializes_as_qualified_string() {
        let table = TableName::new("analytics", "fact_stream");
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, "\"analytics.fact_stream\"");

        let parsed: TableName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, table);
    }
}
