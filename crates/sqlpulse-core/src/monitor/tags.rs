//! Tag derivation from result rows.

use crate::db::RowRecord;

use super::value::{METRIC_COLUMN, TIMESTAMP_COLUMN};

/// Builds the tag set for a row: one `name:value` entry per column,
/// with the reserved `metric` and `timestamp` columns excluded —
/// `metric` is the value and `timestamp` is the emission time, so
/// neither is a dimension.
///
/// Order is insignificant to the daemon; tags are sorted so a given
/// row always produces the same datagram. Global tags are appended by
/// the statsd client, not here.
pub fn build_tags(row: &RowRecord) -> Vec<String> {
    let mut tags: Vec<String> = row
        .iter()
        .filter(|(name, _)| name.as_str() != METRIC_COLUMN && name.as_str() != TIMESTAMP_COLUMN)
        .map(|(name, value)| format!("{}:{}", name, value))
        .collect();
    tags.sort();
    tags
}
