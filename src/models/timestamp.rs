//! Timestamp decoding: the API mixes Unix seconds and ISO-8601 strings

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Convert a JSON scalar into a UTC instant
pub fn parse_instant(value: &Value) -> Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                from_unix(secs)
            } else if let Some(secs) = n.as_f64() {
                from_unix_f64(secs)
            } else {
                Err(format!("unsupported timestamp number {}", n))
            }
        }
        Value::String(s) => parse_str(s),
        other => Err(format!("expected timestamp, found {}", other)),
    }
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, String> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| format!("timestamp {} out of range", secs))
}

fn from_unix_f64(secs: f64) -> Result<DateTime<Utc>, String> {
    if !secs.is_finite() {
        return Err("timestamp is not finite".to_string());
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return Err(format!("timestamp {} out of range", secs));
    }
    Utc.timestamp_opt(whole as i64, nanos.min(999_999_999))
        .single()
        .ok_or_else(|| format!("timestamp {} out of range", secs))
}

fn parse_str(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return from_unix(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Naive ISO-8601 is UTC
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("invalid timestamp '{}'", s))
}

/// Required instant
pub fn instant<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    parse_instant(&value).map_err(D::Error::custom)
}

/// Optional instant; JSON null maps to `None`
pub fn optional_instant<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => parse_instant(&value).map(Some).map_err(D::Error::custom),
    }
}

/// Sequence of instants
pub fn instants<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<DateTime<Utc>>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .iter()
        .map(|v| parse_instant(v).map_err(D::Error::custom))
        .collect()
}
