//! Database access for monitors.
//!
//! Queries are opaque strings supplied by configuration, so the column
//! set of a result row is unknown until runtime. Rows are normalized
//! at the driver boundary into a [`RowRecord`] — a name→value map over
//! the closed [`SqlValue`] variant set — and everything downstream
//! (coercion, tagging, dispatch) switches over that set explicitly.
//!
//! Drivers implement the [`Database`] trait; [`connect`] picks one
//! from the configured database kind. The `postgres` driver is the
//! real one, `mock` is the in-memory double used by tests.

pub mod mock;
pub mod postgres;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Error type for database setup, query and decode failures.
#[derive(Debug, Clone)]
pub enum DbError {
    /// No driver is registered for the configured kind.
    UnknownKind(String),
    /// Connecting to or verifying the database failed.
    Connection(String),
    /// Query execution failed.
    Query(String),
    /// A result row could not be decoded.
    Decode(String),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::UnknownKind(kind) => write!(f, "unknown database kind: {}", kind),
            DbError::Connection(msg) => write!(f, "connection failed: {}", msg),
            DbError::Query(msg) => write!(f, "query failed: {}", msg),
            DbError::Decode(msg) => write!(f, "row decode failed: {}", msg),
        }
    }
}

impl std::error::Error for DbError {}

/// A single dynamically-typed SQL value.
///
/// Drivers map every supported column type into this set when decoding
/// a row; SQL NULL in any column becomes `Null`. A nullable temporal
/// column that holds no value therefore arrives as `Null`, not as a
/// wrapper type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl std::fmt::Display for SqlValue {
    /// Natural textual representation, used for tag values.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "null"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Bytes(v) => {
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            SqlValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// One result row: column name → value. Rebuilt fresh for every row.
pub type RowRecord = HashMap<String, SqlValue>;

/// A SQL-speaking backend: execute a query string, yield decoded rows.
///
/// One connection is owned exclusively by one monitor for the process
/// lifetime; a broken connection is not re-established.
pub trait Database: Send {
    /// Executes `sql` and returns every result row, decoded.
    ///
    /// The outer `Result` is the query itself; each row carries its
    /// own `Result` so that one undecodable row is isolated from the
    /// rest of the set.
    fn query(&mut self, sql: &str) -> Result<Vec<Result<RowRecord, DbError>>, DbError>;
}

/// Opens and verifies a connection for the configured database kind.
///
/// Fails fast: a monitor is never constructed over a connection that
/// has not answered a round-trip.
pub fn connect(kind: &str, uri: &str) -> Result<Box<dyn Database>, DbError> {
    match kind {
        "postgres" | "postgresql" => Ok(Box::new(postgres::PostgresDatabase::connect(uri)?)),
        other => Err(DbError::UnknownKind(other.to_string())),
    }
}
