use std::hash::{Hash, Hasher};

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

use crate::types::{Cell, CdcValue};

/// A complete row of data from a source table.
///
/// Values are ordered to match the column list declared in the table's
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    /// Creates a new table row with the given cell values.
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Returns the row values in column order.
    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    /// Consumes the row and returns its values in column order.
    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }
}

/// A primary key consisting of one or more column values.
///
/// Used as the upsert matching key and as the lookup key for referential
/// integrity checks. Supports composite keys by storing multiple cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RowKey {
    values: Vec<Cell>,
}

// Manual Eq since Cell does not derive it; Cell's PartialEq is reflexive for
// every value the loader produces (floats in keys hash and compare by bits).
impl Eq for RowKey {}

impl RowKey {
    /// Creates a new key from a list of cell values.
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Creates a new key by extracting values from a row at the given indices.
    ///
    /// Callers must have validated the row arity against the table's column
    /// list beforehand.
    pub fn from_row(row: &TableRow, key_indices: &[usize]) -> Self {
        let values = key_indices
            .iter()
            .map(|&idx| row.values()[idx].clone())
            .collect();

        Self { values }
    }

    /// Returns the values of the key.
    pub fn values(&self) -> &[Cell] {
        &self.values
    }
}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.values {
            cell_hash(value, state);
        }
    }
}

/// Keys render as their cell values for reporting purposes.
impl Serialize for RowKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.values.len()))?;
        for value in &self.values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }
}

/// Hashes a cell value in a deterministic way.
fn cell_hash<H: Hasher>(cell: &Cell, state: &mut H) {
    // Hash the discriminant so values of different types never collide.
    std::mem::discriminant(cell).hash(state);

    match cell {
        Cell::Null => {}
        Cell::Bool(value) => value.hash(state),
        Cell::I32(value) => value.hash(state),
        Cell::I64(value) => value.hash(state),
        Cell::F64(value) => value.to_bits().hash(state),
        Cell::String(value) => value.hash(state),
        Cell::Date(value) => value.hash(state),
        Cell::Timestamp(value) => value.hash(state),
        Cell::TimestampTz(value) => value.hash(state),
        Cell::Uuid(value) => value.hash(state),
    }
}

/// A changed source row together with its extracted key and change marker.
///
/// Produced per cycle by the selection step and consumed by the merger; never
/// persisted beyond the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRow {
    /// Primary key of the row.
    pub key: RowKey,
    /// Value of the row's CDC column.
    pub cdc: CdcValue,
    /// The full row, in declared column order.
    pub row: TableRow,
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_key(key: &RowKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn equal_keys_hash_identically() {
        let a = RowKey::new(vec![Cell::I64(1), Cell::String("track".to_string())]);
        let b = RowKey::new(vec![Cell::I64(1), Cell::String("track".to_string())]);

        assert_eq!(a, b);
        assert_eq!(hash_key(&a), hash_key(&b));
    }

    #[test]
    fn different_keys_differ() {
        let a = RowKey::new(vec![Cell::I64(1)]);
        let b = RowKey::new(vec![Cell::I64(2)]);

        assert_ne!(a, b);
        assert_ne!(hash_key(&a), hash_key(&b));
    }

    #[test]
    fn composite_keys_extract_in_index_order() {
        let row = TableRow::new(vec![
            Cell::I64(42),
            Cell::String("name".to_string()),
            Cell::Bool(true),
        ]);

        let key = RowKey::from_row(&row, &[2, 0]);
        assert_eq!(key.values(), &[Cell::Bool(true), Cell::I64(42)]);
    }
}
