//! Row value coercion: metric extraction and timestamp resolution.

use chrono::{DateTime, TimeZone, Utc};

use crate::db::{RowRecord, SqlValue};

/// Column holding the metric value. Required; never emitted as a tag.
pub const METRIC_COLUMN: &str = "metric";

/// Column optionally holding the emission time. Never emitted as a tag.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Error type for value coercion failures. Each one skips a row.
#[derive(Debug, Clone, PartialEq)]
pub enum CoerceError {
    /// The row has no `metric` column.
    MissingMetric,
    /// The `metric` column holds a non-numeric, non-boolean value.
    BadMetric(String),
    /// The `timestamp` column could not be normalized to an instant.
    BadTimestamp(String),
}

impl std::fmt::Display for CoerceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoerceError::MissingMetric => write!(f, "no metric column found"),
            CoerceError::BadMetric(value) => {
                write!(f, "failed to convert metric column value: '{}'", value)
            }
            CoerceError::BadTimestamp(value) => {
                write!(f, "unable to convert timestamp column value: '{}'", value)
            }
        }
    }
}

impl std::error::Error for CoerceError {}

/// Extracts the `metric` column as a float.
///
/// Integers and floats convert directly, booleans map to 1/0.
/// Anything else (string, bytes, NULL, temporal) is an error and the
/// caller skips the row.
pub fn metric_value(row: &RowRecord) -> Result<f64, CoerceError> {
    let value = row.get(METRIC_COLUMN).ok_or(CoerceError::MissingMetric)?;

    match value {
        SqlValue::Int(v) => Ok(*v as f64),
        SqlValue::Float(v) => Ok(*v),
        SqlValue::Bool(true) => Ok(1.0),
        SqlValue::Bool(false) => Ok(0.0),
        other => Err(CoerceError::BadMetric(other.to_string())),
    }
}

/// Resolves the emission timestamp for a row.
///
/// Checked in order, first match wins:
/// 1. No `timestamp` column → now.
/// 2. Temporal value → used as-is.
/// 3. SQL NULL → now (an unset nullable time is not an error).
/// 4. String → strict RFC 3339; empty or non-conforming skips the row.
/// 5. Integer or float → Unix epoch seconds, UTC (floats truncate).
/// 6. Anything else → error, row skipped.
///
/// Timestamp columns arrive from heterogeneous drivers as native
/// temporals, strings or raw epoch numbers; most monitors supply none
/// at all, so "no usable value" defaults to the wall clock instead of
/// failing the row.
pub fn resolve_timestamp(row: &RowRecord) -> Result<DateTime<Utc>, CoerceError> {
    let value = match row.get(TIMESTAMP_COLUMN) {
        None => return Ok(Utc::now()),
        Some(value) => value,
    };

    match value {
        SqlValue::Timestamp(ts) => Ok(*ts),
        SqlValue::Null => Ok(Utc::now()),
        SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| CoerceError::BadTimestamp(s.clone())),
        SqlValue::Int(secs) => from_epoch(*secs),
        SqlValue::Float(secs) => from_epoch(*secs as i64),
        other => Err(CoerceError::BadTimestamp(other.to_string())),
    }
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, CoerceError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| CoerceError::BadTimestamp(secs.to_string()))
}
