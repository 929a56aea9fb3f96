use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::types::Cell;

/// The change marker of a row: the value of its CDC column.
///
/// A watermark stores the greatest [`CdcValue`] seen for a table, and change
/// selection fetches rows strictly greater than it. Values only order against
/// the same family; dates promote to midnight UTC when compared against
/// timestamps, while integer versions never compare against temporal markers.
#[derive(Debug, Clone, PartialEq)]
pub enum CdcValue {
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Integer(i64),
}

impl CdcValue {
    /// Extracts a change marker from a row cell.
    ///
    /// Returns `None` for nulls and for cell types that cannot order a change
    /// stream (strings, floats, booleans).
    pub fn from_cell(cell: &Cell) -> Option<CdcValue> {
        match cell {
            Cell::Date(value) => Some(CdcValue::Date(*value)),
            Cell::Timestamp(value) => Some(CdcValue::Timestamp(Utc.from_utc_datetime(value))),
            Cell::TimestampTz(value) => Some(CdcValue::Timestamp(*value)),
            Cell::I32(value) => Some(CdcValue::Integer(i64::from(*value))),
            Cell::I64(value) => Some(CdcValue::Integer(*value)),
            _ => None,
        }
    }

    /// Parses a change marker from its human-readable form.
    ///
    /// Accepts an ISO-8601 date (`2025-01-03`), an RFC 3339 timestamp, a naive
    /// ISO timestamp interpreted as UTC, or a plain integer.
    pub fn parse(text: &str) -> Result<CdcValue, chrono::ParseError> {
        if let Ok(value) = text.parse::<i64>() {
            return Ok(CdcValue::Integer(value));
        }

        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Ok(CdcValue::Date(date));
        }

        if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
            return Ok(CdcValue::Timestamp(timestamp.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| CdcValue::Timestamp(Utc.from_utc_datetime(&naive)))
    }

    /// Returns `true` when `self` is strictly greater than `other`.
    ///
    /// Incomparable values (integer versus temporal) are never greater, which
    /// makes them ineligible both for selection and for watermark advancement.
    pub fn is_after(&self, other: &CdcValue) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Greater))
    }
}

impl PartialOrd for CdcValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (CdcValue::Date(a), CdcValue::Date(b)) => Some(a.cmp(b)),
            (CdcValue::Timestamp(a), CdcValue::Timestamp(b)) => Some(a.cmp(b)),
            (CdcValue::Integer(a), CdcValue::Integer(b)) => Some(a.cmp(b)),
            (CdcValue::Date(a), CdcValue::Timestamp(b)) => Some(midnight_utc(a).cmp(b)),
            (CdcValue::Timestamp(a), CdcValue::Date(b)) => Some(a.cmp(&midnight_utc(b))),
            _ => None,
        }
    }
}

impl fmt::Display for CdcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdcValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            CdcValue::Timestamp(value) => {
                f.write_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            CdcValue::Integer(value) => write!(f, "{value}"),
        }
    }
}

impl Serialize for CdcValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CdcValue::Integer(value) => serializer.serialize_i64(*value),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for CdcValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Integer(value) => Ok(CdcValue::Integer(value)),
            Raw::Text(text) => CdcValue::parse(&text).map_err(de::Error::custom),
        }
    }
}

fn midnight_utc(date: &NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_order_naturally() {
        let earlier = CdcValue::parse("2025-01-01").unwrap();
        let later = CdcValue::parse("2025-01-03").unwrap();

        assert!(later.is_after(&earlier));
        assert!(!earlier.is_after(&later));
        assert!(!earlier.is_after(&earlier));
    }

    #[test]
    fn dates_promote_against_timestamps() {
        let date = CdcValue::parse("2025-01-02").unwrap();
        let timestamp = CdcValue::parse("2025-01-02T00:00:01Z").unwrap();

        assert!(timestamp.is_after(&date));
        assert!(!date.is_after(&timestamp));
    }

    #[test]
    fn integers_never_order_against_temporals() {
        let version = CdcValue::Integer(10);
        let timestamp = CdcValue::parse("2025-01-02T00:00:00Z").unwrap();

        assert!(!version.is_after(&timestamp));
        assert!(!timestamp.is_after(&version));
    }

    #[test]
    fn round_trips_through_serde() {
        for text in ["2025-01-03", "2025-01-03T12:30:00Z", "42"] {
            let value = CdcValue::parse(text).unwrap();
            let json = serde_json::to_string(&value).unwrap();
            let parsed: CdcValue = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, value);
        }
    }

    #[test]
    fn extracts_markers_from_cells() {
        assert_eq!(
            CdcValue::from_cell(&Cell::I64(7)),
            Some(CdcValue::Integer(7))
        );
        assert_eq!(CdcValue::from_cell(&Cell::Null), None);
        assert_eq!(CdcValue::from_cell(&Cell::String("x".into())), None);
    }
}
