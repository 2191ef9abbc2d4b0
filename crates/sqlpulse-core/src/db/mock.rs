//! In-memory mock database for testing monitors without a server.
//!
//! `MockDatabase` returns a scripted result set for every query,
//! allowing tests to exercise the full decode→coerce→tag→dispatch
//! pipeline, including per-row decode failures and failing queries.

use super::{Database, DbError, RowRecord, SqlValue};

/// Scripted [`Database`] implementation.
#[derive(Debug, Default)]
pub struct MockDatabase {
    rows: Vec<Result<RowRecord, DbError>>,
    fail: Option<String>,
    queries: Vec<String>,
}

impl MockDatabase {
    /// Creates a mock that returns an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock whose every query fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail: Some(message.into()),
            ..Self::default()
        }
    }

    /// Appends a row to the scripted result set.
    pub fn with_row(mut self, row: RowRecord) -> Self {
        self.rows.push(Ok(row));
        self
    }

    /// Appends a row that fails to decode.
    pub fn with_bad_row(mut self, message: impl Into<String>) -> Self {
        self.rows.push(Err(DbError::Decode(message.into())));
        self
    }

    /// Queries executed so far, in order.
    pub fn queries(&self) -> &[String] {
        &self.queries
    }
}

impl Database for MockDatabase {
    fn query(&mut self, sql: &str) -> Result<Vec<Result<RowRecord, DbError>>, DbError> {
        self.queries.push(sql.to_string());

        if let Some(ref message) = self.fail {
            return Err(DbError::Query(message.clone()));
        }

        Ok(self.rows.clone())
    }
}

/// Builds a [`RowRecord`] from `(column, value)` pairs.
pub fn row(pairs: &[(&str, SqlValue)]) -> RowRecord {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_rows() {
        let mut db = MockDatabase::new()
            .with_row(row(&[("metric", SqlValue::Int(1))]))
            .with_bad_row("scan error");

        let rows = db.query("SELECT 1").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        assert!(rows[1].is_err());
        assert_eq!(db.queries(), &["SELECT 1".to_string()]);
    }

    #[test]
    fn test_failing_query() {
        let mut db = MockDatabase::failing("connection reset");
        let err = db.query("SELECT 1").unwrap_err();
        assert!(matches!(err, DbError::Query(_)));
    }
}
