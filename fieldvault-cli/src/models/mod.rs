pub mod directory;
pub mod report;
pub mod settings;

use chrono::{DateTime, Utc};
use fieldvault_core::serializer::iso8601;
use rusqlite::types::Type;
use rusqlite::Row;

// Timestamps are stored as RFC 3339 TEXT.

fn ts_to_sql(t: &DateTime<Utc>) -> String {
    iso8601::format(t)
}

fn opt_ts_to_sql(t: &Option<DateTime<Utc>>) -> Option<String> {
    t.as_ref().map(iso8601::format)
}

fn ts_from_row(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn opt_ts_from_row(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_ts(idx, &raw))
        .transpose()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    iso8601::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}
