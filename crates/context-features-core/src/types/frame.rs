//! Minimal row-major tabular frame exchanged with the offline engine.
//!
//! Cells are JSON values. A column named twice is allowed: joins append
//! feature columns even when a passthrough column already has that name,
//! and lookups by name resolve to the first match.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a frame, rejecting rows whose width differs from the header.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> CoreResult<()> {
        if row.len() != self.columns.len() {
            return Err(CoreError::validation(
                "frame",
                format!(
                    "row has {} cells but frame has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of `name`, or a validation error naming the missing column.
    pub fn require_column(&self, name: &str) -> CoreResult<usize> {
        self.column_index(name).ok_or_else(|| {
            CoreError::validation(
                name,
                format!("column '{}' not found in frame {:?}", name, self.columns),
            )
        })
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All cells of `column`, top to bottom.
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Append a column. `values` must have one entry per row.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> CoreResult<Self> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(CoreError::validation(
                name,
                format!(
                    "column has {} values but frame has {} rows",
                    values.len(),
                    self.rows.len()
                ),
            ));
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(name);
        Ok(self)
    }
}

/// Naive layouts accepted as UTC, tried in order.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a frame timestamp cell: integer epoch millis, an RFC 3339 string,
/// or a naive ISO-8601 datetime or date read as UTC.
pub fn cell_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

/// Render a cell as an entity id. Strings are used verbatim, numbers and
/// booleans by their display form; null and composite values are rejected.
pub fn cell_entity_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Frame {
        Frame::from_rows(
            ["user_id", "timestamp"],
            vec![
                vec![json!("u1"), json!("2024-01-01T00:00:00Z")],
                vec![json!("u2"), json!(1_704_067_200_000i64)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let mut frame = Frame::new(["a", "b"]);
        assert!(frame.push_row(vec![json!(1)]).is_err());
        assert!(frame.push_row(vec![json!(1), json!(2)]).is_ok());
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn test_require_column_is_validation_error() {
        let err = sample().require_column("missing").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_with_column_appends_even_on_collision() {
        let frame = sample()
            .with_column("user_id", vec![json!(1), json!(2)])
            .unwrap();
        assert_eq!(frame.columns(), &["user_id", "timestamp", "user_id"]);
        assert_eq!(frame.value(0, "user_id"), Some(&json!("u1")));
        assert_eq!(frame.rows()[0][2], json!(1));
    }

    #[test]
    fn test_with_column_length_mismatch() {
        assert!(sample().with_column("x", vec![json!(1)]).is_err());
    }

    #[test]
    fn test_cell_timestamp_formats_agree() {
        let frame = sample();
        let a = cell_timestamp(frame.value(0, "timestamp").unwrap()).unwrap();
        let b = cell_timestamp(frame.value(1, "timestamp").unwrap()).unwrap();
        assert_eq!(a, b);
        assert!(cell_timestamp(&json!("yesterday")).is_none());
        assert!(cell_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_cell_timestamp_reads_naive_strings_as_utc() {
        let expected = Utc.timestamp_millis_opt(1_704_067_200_000).unwrap();
        for naive in [
            "2024-01-01T00:00:00",
            "2024-01-01 00:00:00",
            "2024-01-01T00:00:00.000",
            "2024-01-01",
        ] {
            assert_eq!(cell_timestamp(&json!(naive)), Some(expected), "{}", naive);
        }
    }

    #[test]
    fn test_cell_entity_id() {
        assert_eq!(cell_entity_id(&json!("u1")).as_deref(), Some("u1"));
        assert_eq!(cell_entity_id(&json!(42)).as_deref(), Some("42"));
        assert!(cell_entity_id(&json!(null)).is_none());
    }
}
