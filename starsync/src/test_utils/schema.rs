//! Star schema fixtures for a music streaming warehouse.
//!
//! Mirrors the production table set: four dimensions (users, artists, tracks,
//! dates) and one fact table of playback events referencing three of them.
//! DimTrack depends on DimArtist for validation only, since `artist_id` is
//! denormalized onto tracks and not checked at merge time.

use chrono::{DateTime, NaiveDate, Utc};
use starsync_config::shared::{LoaderConfig, TableConfig, TableReference, TablesConfig};

use crate::types::{Cell, TableName, TableRow};

/// Schema every fixture table lives in.
pub const SCHEMA: &str = "analytics";

/// Parses an RFC 3339 timestamp into a timestamp cell.
pub fn ts(text: &str) -> Cell {
    Cell::TimestampTz(parse_ts(text))
}

/// Parses an ISO date into a date cell.
pub fn date(text: &str) -> Cell {
    Cell::Date(
        NaiveDate::parse_from_str(text, "%Y-%m-%d").expect("fixture dates are well-formed"),
    )
}

fn parse_ts(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .expect("fixture timestamps are well-formed")
        .with_timezone(&Utc)
}

/// A loader configuration tuned for fast tests.
pub fn fast_loader_config() -> LoaderConfig {
    LoaderConfig {
        step_timeout_ms: 5_000,
        ..LoaderConfig::default()
    }
}

pub fn dim_user_name() -> TableName {
    TableName::new(SCHEMA, "dim_user")
}

pub fn dim_artist_name() -> TableName {
    TableName::new(SCHEMA, "dim_artist")
}

pub fn dim_track_name() -> TableName {
    TableName::new(SCHEMA, "dim_track")
}

pub fn dim_date_name() -> TableName {
    TableName::new(SCHEMA, "dim_date")
}

pub fn fact_stream_name() -> TableName {
    TableName::new(SCHEMA, "fact_stream")
}

pub fn dim_user_config() -> TableConfig {
    TableConfig {
        schema: SCHEMA.to_string(),
        table: "dim_user".to_string(),
        columns: vec![
            "user_id".to_string(),
            "user_name".to_string(),
            "level".to_string(),
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

pub fn dim_artist_config() -> TableConfig {
    TableConfig {
        schema: SCHEMA.to_string(),
        table: "dim_artist".to_string(),
        columns: vec![
            "artist_id".to_string(),
            "artist_name".to_string(),
            "updated_at".to_string(),
        ],
        cdc_column: "updated_at".to_string(),
        primary_key: vec!["artist_id".to_string()],
        references: vec![],
        depends_on: vec![],
        from_date: None,
        initial_load: false,
    }
}

pub fn dim_track_config() -> TableConfig {
    TableConfig {
        schema: SCHEMA.to_string(),
        table: "dim_track".to_string(),
        columns: vec![
            "track_id".to_string(),
            "artist_id".to_string(),
            "title".to_string(),
            "duration_ms".to_string(),
            "updated_at".to_string(),
        ],
        cdc_column: "updated_at".to_string(),
        primary_key: vec!["track_id".to_string()],
        references: vec![],
        depends_on: vec![format!("{SCHEMA}.dim_artist")],
        from_date: None,
        initial_load: false,
    }
}

pub fn dim_date_config() -> TableConfig {
    TableConfig {
        schema: SCHEMA.to_string(),
        table: "dim_date".to_string(),
        columns: vec![
            "date_key".to_string(),
            "year".to_string(),
            "month".to_string(),
            "day".to_string(),
            "updated_at".to_string(),
        ],
        cdc_column: "updated_at".to_string(),
        primary_key: vec!["date_key".to_string()],
        references: vec![],
        depends_on: vec![],
        from_date: None,
        initial_load: false,
    }
}

pub fn fact_stream_config() -> TableConfig {
    TableConfig {
        schema: SCHEMA.to_string(),
        table: "fact_stream".to_string(),
        columns: vec![
            "stream_id".to_string(),
            "user_id".to_string(),
            "track_id".to_string(),
            "date_key".to_string(),
            "ms_played".to_string(),
            "played_at".to_string(),
        ],
        cdc_column: "played_at".to_string(),
        primary_key: vec!["stream_id".to_string()],
        references: vec![
            TableReference {
                column: "user_id".to_string(),
                table: format!("{SCHEMA}.dim_user"),
            },
            TableReference {
                column: "track_id".to_string(),
                table: format!("{SCHEMA}.dim_track"),
            },
            TableReference {
                column: "date_key".to_string(),
                table: format!("{SCHEMA}.dim_date"),
            },
        ],
        depends_on: vec![],
        from_date: None,
        initial_load: false,
    }
}

/// The full star schema, dimensions before the fact, in configuration order.
pub fn star_schema() -> TablesConfig {
    TablesConfig {
        tables: vec![
            dim_user_config(),
            dim_artist_config(),
            dim_track_config(),
            dim_date_config(),
            fact_stream_config(),
        ],
    }
}

pub fn user_row(user_id: i64, user_name: &str, updated_at: &str) -> TableRow {
    TableRow::new(vec![
        Cell::I64(user_id),
        Cell::String(user_name.to_string()),
        Cell::String("free".to_string()),
        ts(updated_at),
    ])
}

pub fn artist_row(artist_id: i64, artist_name: &str, updated_at: &str) -> TableRow {
    TableRow::new(vec![
        Cell::I64(artist_id),
        Cell::String(artist_name.to_string()),
        ts(updated_at),
    ])
}

pub fn track_row(track_id: i64, artist_id: i64, title: &str, updated_at: &str) -> TableRow {
    TableRow::new(vec![
        Cell::I64(track_id),
        Cell::I64(artist_id),
        Cell::String(title.to_string()),
        Cell::I32(180_000),
        ts(updated_at),
    ])
}

pub fn date_row(date_key: &str, updated_at: &str) -> TableRow {
    let key = NaiveDate::parse_from_str(date_key, "%Y-%m-%d")
        .expect("fixture dates are well-formed");

    TableRow::new(vec![
        Cell::Date(key),
        Cell::I32(key.format("%Y").to_string().parse().unwrap()),
        Cell::I32(key.format("%m").to_string().parse().unwrap()),
        Cell::I32(key.format("%d").to_string().parse().unwrap()),
        ts(updated_at),
    ])
}

pub fn stream_row(
    stream_id: i64,
    user_id: i64,
    track_id: i64,
    date_key: &str,
    ms_played: i32,
    played_at: &str,
) -> TableRow {
    TableRow::new(vec![
        Cell::I64(stream_id),
        Cell::I64(user_id),
        Cell::I64(track_id),
        date(date_key),
        Cell::I32(ms_played),
        ts(played_at),
    ])
}
