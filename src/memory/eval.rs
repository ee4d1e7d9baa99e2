//! Value comparison and criterion evaluation over in-memory rows.

use crate::condition::{Criterion, Filter};
use crate::record::{split_column, Record, Value};
use std::cmp::Ordering;

/// Value of `column` in `row`.
///
/// Base table columns are stored unqualified, so `posts.id` on a `posts`
/// scope resolves to `id`. Joined columns keep their `table.column` key.
pub(crate) fn lookup<'a>(row: &'a Record, base: &str, column: &str) -> Option<&'a Value> {
    if let Some(value) = row.get(column) {
        return Some(value);
    }
    match split_column(column) {
        (Some(table), column) if table == base => row.get(column),
        _ => None,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting: null first, numbers numerically, strings
/// lexicographically
pub(crate) fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ if rank(a) == rank(b) => a.to_string().cmp(&b.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Equality with `1 == 1.0`
pub(crate) fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

/// Outcome of one column test under SQL three-valued logic.
///
/// `None` is UNKNOWN: a null column compared with anything but `Eq(null)`
/// (IS NULL). Unknown rows are not selected, and stay unselected under NOT.
pub(crate) fn criterion_outcome(value: Option<&Value>, criterion: &Criterion) -> Option<bool> {
    let value = value.unwrap_or(&Value::Null);
    match criterion {
        Criterion::Eq(Value::Null) => Some(value.is_null()),
        _ if value.is_null() => None,
        Criterion::Eq(expected) => Some(equal(value, expected)),
        Criterion::In(candidates) => Some(candidates.iter().any(|candidate| equal(value, candidate))),
        Criterion::Between(low, high) => Some(
            compare(value, low) != Ordering::Less && compare(value, high) != Ordering::Greater,
        ),
    }
}

/// AND of the filter's column tests, with SQL's unknown propagation
pub(crate) fn filter_outcome(row: &Record, base: &str, filter: &Filter) -> Option<bool> {
    let mut outcome = Some(true);
    for (column, criterion) in filter.iter() {
        match criterion_outcome(lookup(row, base, column), criterion) {
            Some(false) => return Some(false),
            None => outcome = None,
            Some(true) => {}
        }
    }
    outcome
}
