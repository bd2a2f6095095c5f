//! Timestamp encoding shared by every table.
//!
//! Timestamps are stored as RFC 3339 UTC text with a fixed microsecond
//! precision, so string order in SQL equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub(crate) fn encode(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now() -> String {
    encode(Utc::now())
}

/// Read a timestamp column, reporting the column index on failure.
pub(crate) fn column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse(&raw, idx)
}

/// Read a nullable timestamp column.
pub(crate) fn opt_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse(&s, idx)).transpose()
}

fn parse(raw: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
