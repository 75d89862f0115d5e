//! ISO-8601 timestamp codec for `#[serde(with = "iso8601")]` fields.
//!
//! Timestamps are written as RFC 3339 in UTC with a `Z` suffix and only as
//! many sub-second digits as the value carries, so a decode of an encode is
//! exact. Unparsable input decodes to the Unix epoch instead of failing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn format(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Strings are parsed as RFC 3339; integers are taken as Unix milliseconds.
fn coerce(value: Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse(&s),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

pub fn serialize<S>(t: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(t))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce(value).unwrap_or_default())
}

pub mod option {
    use super::*;

    pub fn serialize<S>(t: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match t {
            Some(t) => serializer.serialize_some(&format(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce(value))
    }
}
