//! Permissive accessors over [`RawFields`].
//!
//! Nothing here fails: a missing or mistyped field yields `None` (or the
//! caller-supplied default), matching how the database SDK decodes loosely
//! typed documents.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use super::RawFields;

pub fn string(fields: &RawFields, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

pub fn string_or_default(fields: &RawFields, key: &str) -> String {
    match string(fields, key) {
        Some(value) => value,
        None => {
            tracing::trace!(field = key, "missing or non-string field, using empty string");
            String::new()
        }
    }
}

pub fn integer(fields: &RawFields, key: &str) -> Option<i64> {
    fields.get(key).and_then(Value::as_i64)
}

/// Decode a `{"seconds": i64, "nanoseconds": u32}` timestamp value.
pub fn timestamp(fields: &RawFields, key: &str) -> Option<DateTime<Utc>> {
    let obj = fields.get(key)?.as_object()?;
    let seconds = obj.get("seconds")?.as_i64()?;
    let nanos = obj
        .get("nanoseconds")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        .min(999_999_999) as u32;
    Utc.timestamp_opt(seconds, nanos).single()
}

pub fn timestamp_or(fields: &RawFields, key: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    match timestamp(fields, key) {
        Some(ts) => ts,
        None => {
            tracing::trace!(field = key, "missing or mistyped timestamp, using decode time");
            fallback
        }
    }
}

/// Encode a point in time in the document-database timestamp shape.
pub fn timestamp_value(ts: DateTime<Utc>) -> Value {
    json!({
        "seconds": ts.timestamp(),
        "nanoseconds": ts.timestamp_subsec_nanos(),
    })
}
