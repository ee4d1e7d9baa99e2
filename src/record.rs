//! Row representation shared by every engine.
//!
//! A [`Record`] is one row keyed by column name. Values are JSON values so the
//! same record can travel through the memory engine, sea-query parameters and
//! serde-based entity mapping without a bespoke value type.

/// A single column value
pub type Value = serde_json::Value;

/// One row, keyed by (optionally `table.`-qualified) column name
pub type Record = serde_json::Map<String, Value>;

/// Build a record from `(column, value)` pairs.
///
/// ```
/// use tidepool::record::{record, Value};
///
/// let row = record([("name", Value::from("L")), ("age", Value::from(3))]);
/// assert_eq!(row["name"], "L");
/// ```
pub fn record<K, I>(pairs: I) -> Record
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Split a possibly qualified column name into `(table, column)`
pub fn split_column(column: &str) -> (Option<&str>, &str) {
    match column.split_once('.') {
        Some((table, column)) => (Some(table), column),
        None => (None, column),
    }
}
