//! Lazy query plan over one in-memory table.

use super::eval::{self, compare, filter_outcome, lookup};
use super::{MemoryStore, Table};
use crate::condition::{Direction, Join, JoinKind, OrderBy, Predicate};
use crate::error::{EngineError, ModelError};
use crate::record::{Record, Value};
use crate::scope::{Aggregate, Scope, TransactionOptions};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Opaque row predicate for the memory engine
#[derive(Clone)]
pub struct Matcher(Arc<dyn Fn(&Record) -> bool + Send + Sync>);

impl Matcher {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn matches(&self, row: &Record) -> bool {
        (self.0)(row)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matcher(..)")
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Predicate<Matcher>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

impl Node {
    /// SQL three-valued evaluation; `None` is UNKNOWN
    fn eval(&self, row: &Record, base: &str) -> Option<bool> {
        match self {
            Node::Leaf(Predicate::Columns(filter)) => filter_outcome(row, base, filter),
            Node::Leaf(Predicate::Expr(matcher)) => Some(matcher.matches(row)),
            Node::Not(node) => node.eval(row, base).map(|outcome| !outcome),
            Node::And(left, right) => match (left.eval(row, base), right.eval(row, base)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Node::Or(left, right) => match (left.eval(row, base), right.eval(row, base)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Projection {
    Columns(Vec<String>),
    BaseTable,
}

#[derive(Debug, Clone, Default)]
struct Plan {
    joins: Vec<Join>,
    filter: Option<Node>,
    group: Vec<String>,
    ordering: Vec<OrderBy>,
    offset: Option<u64>,
    limit: Option<u64>,
    projection: Option<Projection>,
}

/// [`Scope`] over a [`MemoryStore`] table.
///
/// Rows are produced in the order join, filter, group, order, offset, limit,
/// project, whatever order the primitives were called in. Writes only look
/// at the filter.
#[derive(Debug, Clone)]
pub struct MemoryScope {
    store: MemoryStore,
    table: String,
    plan: Plan,
}

impl MemoryScope {
    pub(crate) fn new(store: MemoryStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            plan: Plan::default(),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn combine(mut self, node: Node, or: bool) -> Self {
        self.plan.filter = Some(match self.plan.filter.take() {
            None => node,
            Some(current) if or => Node::Or(Box::new(current), Box::new(node)),
            Some(current) => Node::And(Box::new(current), Box::new(node)),
        });
        self
    }

    fn selected(&self, row: &Record) -> bool {
        self.plan
            .filter
            .as_ref()
            .map_or(true, |node| node.eval(row, &self.table) == Some(true))
    }

    fn joined(&self, base: &Table, joins: &[(Join, Vec<Record>)]) -> Vec<Record> {
        let mut rows = base.rows.clone();
        for (join, joined_rows) in joins {
            rows = rows
                .into_iter()
                .flat_map(|row| {
                    let foreign = lookup(&row, &self.table, &join.foreign_key)
                        .cloned()
                        .unwrap_or(Value::Null);
                    let mut matched: Vec<Record> = joined_rows
                        .iter()
                        .filter(|other| {
                            !foreign.is_null()
                                && other.get(&join.key).is_some_and(|key| eval::equal(key, &foreign))
                        })
                        .map(|other| {
                            let mut merged = row.clone();
                            for (column, value) in other {
                                merged.insert(format!("{}.{column}", join.table), value.clone());
                            }
                            merged
                        })
                        .collect();
                    if matched.is_empty() && join.kind == JoinKind::Left {
                        matched.push(row);
                    }
                    matched
                })
                .collect();
        }
        rows
    }

    /// Rows after join, filter and group
    fn filtered(&self) -> Result<Vec<Record>, EngineError> {
        self.store.read(|tables| {
            let base = tables.get(&self.table).ok_or_else(|| undefined_table(&self.table))?;
            let joins = self
                .plan
                .joins
                .iter()
                .map(|join| {
                    let joined = tables.get(&join.table).ok_or_else(|| undefined_table(&join.table))?;
                    Ok((join.clone(), joined.rows.clone()))
                })
                .collect::<Result<Vec<_>, EngineError>>()?;

            let mut rows: Vec<Record> = self
                .joined(base, &joins)
                .into_iter()
                .filter(|row| self.selected(row))
                .collect();

            if !self.plan.group.is_empty() {
                let mut seen = HashSet::new();
                rows.retain(|row| {
                    let key: Vec<String> = self
                        .plan
                        .group
                        .iter()
                        .map(|column| lookup(row, &self.table, column).map_or_else(String::new, Value::to_string))
                        .collect();
                    seen.insert(key)
                });
            }

            Ok(rows)
        })
    }

    fn sort(&self, rows: &mut [Record]) {
        if self.plan.ordering.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            self.plan
                .ordering
                .iter()
                .map(|order| {
                    let left = lookup(a, &self.table, &order.column).unwrap_or(&Value::Null);
                    let right = lookup(b, &self.table, &order.column).unwrap_or(&Value::Null);
                    match order.direction {
                        Direction::Asc => compare(left, right),
                        Direction::Desc => compare(right, left),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    fn project(&self, row: Record) -> Record {
        match &self.plan.projection {
            None => row,
            Some(Projection::BaseTable) => row
                .into_iter()
                .filter(|(column, _)| !column.contains('.'))
                .collect(),
            Some(Projection::Columns(columns)) => columns
                .iter()
                .map(|column| {
                    let value = lookup(&row, &self.table, column).cloned().unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect(),
        }
    }

    fn column_values(&self, column: &str) -> Result<Vec<Value>, EngineError> {
        Ok(self
            .filtered()?
            .iter()
            .filter_map(|row| lookup(row, &self.table, column).cloned())
            .filter(|value| !value.is_null())
            .collect())
    }
}

fn undefined_table(table: &str) -> EngineError {
    EngineError::new(
        "memory.undefined_table",
        format!("relation \"{table}\" does not exist"),
    )
}

fn non_numeric(aggregate: Aggregate, column: &str) -> EngineError {
    EngineError::new(
        "memory.invalid_aggregate",
        format!("{} is undefined for non-numeric column \"{column}\"", aggregate.as_str()),
    )
}

fn numbers(aggregate: Aggregate, column: &str, values: &[Value]) -> Result<Vec<f64>, EngineError> {
    values
        .iter()
        .map(|value| value.as_f64().ok_or_else(|| non_numeric(aggregate, column)))
        .collect()
}

/// Values as exact integers, `None` if any is not an `i64`
fn integers(values: &[Value]) -> Option<Vec<i64>> {
    values.iter().map(Value::as_i64).collect()
}

impl Scope for MemoryScope {
    type Expr = Matcher;

    fn table_name(&self) -> &str {
        &self.table
    }

    fn filter(self, predicate: Predicate<Matcher>) -> Self {
        self.combine(Node::Leaf(predicate), false)
    }

    fn exclude(self, predicate: Predicate<Matcher>) -> Self {
        self.combine(Node::Not(Box::new(Node::Leaf(predicate))), false)
    }

    fn or(self, predicate: Predicate<Matcher>) -> Self {
        self.combine(Node::Leaf(predicate), true)
    }

    fn select(mut self, columns: &[String]) -> Self {
        self.plan.projection = Some(Projection::Columns(columns.to_vec()));
        self
    }

    fn select_all(mut self) -> Self {
        self.plan.projection = Some(Projection::BaseTable);
        self
    }

    fn limit(mut self, limit: u64) -> Self {
        self.plan.limit = Some(limit);
        self
    }

    fn offset(mut self, offset: u64) -> Self {
        self.plan.offset = Some(offset);
        self
    }

    fn order(mut self, ordering: &[OrderBy]) -> Self {
        self.plan.ordering = ordering.to_vec();
        self
    }

    fn order_more(mut self, ordering: &[OrderBy]) -> Self {
        self.plan.ordering.extend_from_slice(ordering);
        self
    }

    fn group(mut self, columns: &[String]) -> Self {
        self.plan.group = columns.to_vec();
        self
    }

    fn join_table(mut self, join: &Join) -> Self {
        self.plan.joins.push(join.clone());
        self
    }

    fn rows(&self) -> Result<Vec<Record>, EngineError> {
        let mut rows = self.filtered()?;
        self.sort(&mut rows);

        let offset = self.plan.offset.unwrap_or(0) as usize;
        let limit = self.plan.limit.map_or(usize::MAX, |limit| limit as usize);

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| self.project(row))
            .collect())
    }

    fn insert(&self, record: Record, identity: &str) -> Result<Value, EngineError> {
        self.store.insert_record(&self.table, record, identity)
    }

    fn update(&self, changes: Record) -> Result<u64, EngineError> {
        let table = self.table.clone();
        self.store.write(|tables| {
            let stored = tables.get_mut(&table).ok_or_else(|| undefined_table(&table))?;

            let mut updated = stored.rows.clone();
            let mut count = 0;
            for row in updated.iter_mut().filter(|row| self.selected(row)) {
                for (column, value) in &changes {
                    row.insert(column.clone(), value.clone());
                }
                count += 1;
            }

            stored.check_constraints(&table, &updated)?;
            stored.rows = updated;
            Ok(count)
        })
    }

    fn delete(&self) -> Result<u64, EngineError> {
        let table = self.table.clone();
        self.store.write(|tables| {
            let stored = tables.get_mut(&table).ok_or_else(|| undefined_table(&table))?;
            let before = stored.rows.len();
            stored.rows.retain(|row| !self.selected(row));
            Ok((before - stored.rows.len()) as u64)
        })
    }

    fn aggregate(&self, aggregate: Aggregate, column: &str) -> Result<Option<Value>, EngineError> {
        let values = self.column_values(column)?;
        if values.is_empty() {
            return Ok(None);
        }

        let result = match aggregate {
            Aggregate::Max => values.into_iter().max_by(|a, b| compare(a, b)),
            Aggregate::Min => values.into_iter().min_by(|a, b| compare(a, b)),
            Aggregate::Sum => {
                let exact = integers(&values)
                    .and_then(|ints| ints.iter().try_fold(0i64, |sum, n| sum.checked_add(*n)));
                match exact {
                    Some(sum) => Some(Value::from(sum)),
                    None => Some(Value::from(numbers(aggregate, column, &values)?.iter().sum::<f64>())),
                }
            }
            Aggregate::Avg => {
                let numbers = numbers(aggregate, column, &values)?;
                Some(Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64))
            }
            Aggregate::Interval => {
                let exact = integers(&values).and_then(|ints| {
                    let max = ints.iter().max()?;
                    let min = ints.iter().min()?;
                    max.checked_sub(*min)
                });
                match exact {
                    Some(interval) => Some(Value::from(interval)),
                    None => {
                        let numbers = numbers(aggregate, column, &values)?;
                        let max = numbers.iter().copied().fold(f64::MIN, f64::max);
                        let min = numbers.iter().copied().fold(f64::MAX, f64::min);
                        Some(Value::from(max - min))
                    }
                }
            }
        };

        Ok(result)
    }

    fn count(&self) -> Result<u64, EngineError> {
        Ok(self.rows()?.len() as u64)
    }

    fn transaction<T, F>(&self, options: &TransactionOptions, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Result<T, ModelError>,
    {
        log::debug!("memory transaction begin ({options:?})");
        let snapshot = self.store.snapshot();
        match f() {
            Ok(value) => {
                log::debug!("memory transaction commit");
                Ok(value)
            }
            Err(err) => {
                log::debug!("memory transaction rollback: {err}");
                self.store.restore(snapshot);
                Err(err)
            }
        }
    }
}
