//! Conversions between frame cells and SQLite values.

use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

use context_features_core::types::{cell_entity_id, cell_timestamp};

use crate::error::OfflineError;

/// Bind form of a JSON cell. Booleans become 0/1; arrays and objects are
/// stored as their JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        composite => SqlValue::Text(composite.to_string()),
    }
}

/// JSON form of a result cell. Non-finite reals read back as null.
pub fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Epoch microseconds, the unit feature relations store timestamps in.
#[inline]
pub fn datetime_micros(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

/// Parse a timestamp cell into epoch microseconds.
pub fn cell_micros(value: &Value, column: &str) -> Result<i64, OfflineError> {
    cell_timestamp(value)
        .map(datetime_micros)
        .ok_or_else(|| OfflineError::InvalidValue {
            column: column.to_string(),
            message: format!("cannot parse timestamp from {}", value),
        })
}

/// Entity id for a key cell. Null keys match nothing and are kept as `None`.
pub fn cell_key(value: &Value, column: &str) -> Result<Option<String>, OfflineError> {
    if value.is_null() {
        return Ok(None);
    }
    cell_entity_id(value)
        .map(Some)
        .ok_or_else(|| OfflineError::InvalidValue {
            column: column.to_string(),
            message: format!("unsupported entity id {}", value),
        })
}
