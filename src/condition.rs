//! Conditions accumulated by a [`Query`](crate::Query).
//!
//! A condition is a tagged operation: a [`ConditionKind`] plus its payload.
//! Conditions are kept in insertion order and replayed in exactly that order
//! when a query is resolved, so the sequence itself carries meaning.

use crate::record::Value;
use std::fmt;
use std::ops::RangeInclusive;

/// Test applied to a single column
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// column = value (`null` means IS NULL)
    Eq(Value),
    /// column IN (values)
    In(Vec<Value>),
    /// low <= column <= high
    Between(Value, Value),
}

impl From<Value> for Criterion {
    /// Arrays become membership tests, anything else an equality test
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => Criterion::In(values),
            other => Criterion::Eq(other),
        }
    }
}

impl From<RangeInclusive<Value>> for Criterion {
    fn from(range: RangeInclusive<Value>) -> Self {
        let (low, high) = range.into_inner();
        Criterion::Between(low, high)
    }
}

/// Column to criterion mapping, combined with AND
///
/// # Example
///
/// ```
/// use tidepool::Filter;
///
/// let filter = Filter::new()
///     .eq("published", true)
///     .any_of("author", ["L", "MG"])
///     .between("age", 18, 65);
/// assert_eq!(filter.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    columns: Vec<(String, Criterion)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from `(column, value)` pairs.
    ///
    /// Array values mean "one of these values".
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |filter, (column, value)| filter.eq(column, value))
    }

    /// column = value, or column IN value when value is an array
    #[must_use]
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(column, Criterion::from(value.into()))
    }

    /// column IN (values)
    #[must_use]
    pub fn any_of<V, I>(self, column: impl Into<String>, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        self.with(column, Criterion::In(values.into_iter().map(Into::into).collect()))
    }

    /// low <= column <= high
    #[must_use]
    pub fn between(
        self,
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.with(column, Criterion::Between(low.into(), high.into()))
    }

    /// Add an arbitrary criterion
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, criterion: impl Into<Criterion>) -> Self {
        self.columns.push((column.into(), criterion.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Criterion)> {
        self.columns.iter().map(|(column, criterion)| (column.as_str(), criterion))
    }
}

/// Filter predicate: a column mapping or an opaque engine expression.
///
/// `E` is the engine's expression type (see [`Scope::Expr`](crate::Scope::Expr));
/// this layer stores it and hands it back to the engine without looking inside.
#[derive(Clone, PartialEq)]
pub enum Predicate<E> {
    Columns(Filter),
    Expr(E),
}

impl<E> Predicate<E> {
    /// A column mapping with no columns is the only invalid predicate
    pub fn is_empty(&self) -> bool {
        matches!(self, Predicate::Columns(filter) if filter.is_empty())
    }
}

impl<E> From<Filter> for Predicate<E> {
    fn from(filter: Filter) -> Self {
        Predicate::Columns(filter)
    }
}

impl<E> fmt::Debug for Predicate<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Columns(filter) => f.debug_tuple("Columns").field(filter).finish(),
            Predicate::Expr(_) => f.write_str("Expr(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One ordering column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Join of another table onto the base collection.
///
/// Rows match when `<table>.<key> = <foreign_key>`, where `foreign_key` is
/// qualified by the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub key: String,
    pub foreign_key: String,
}

/// Overrides for the default join columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOptions {
    pub key: Option<String>,
    pub foreign_key: Option<String>,
}

impl JoinOptions {
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }
}

/// Tag of an accumulated condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Where,
    Or,
    Exclude,
    Select,
    SelectAll,
    Limit,
    Offset,
    Order,
    OrderMore,
    Group,
    JoinTable,
}

const OPPOSITES: [(ConditionKind, ConditionKind); 2] = [
    (ConditionKind::Where, ConditionKind::Exclude),
    (ConditionKind::Exclude, ConditionKind::Where),
];

impl ConditionKind {
    /// Logical opposite for filter tags; every other tag maps to itself
    pub fn opposite(self) -> Self {
        OPPOSITES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or(self, |(_, opposite)| *opposite)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, ConditionKind::Order | ConditionKind::OrderMore)
    }
}

/// One accumulated operation
#[derive(Debug, Clone, PartialEq)]
pub enum Condition<E> {
    Where(Predicate<E>),
    Or(Predicate<E>),
    Exclude(Predicate<E>),
    Select(Vec<String>),
    SelectAll,
    Limit(u64),
    Offset(u64),
    Order(Vec<OrderBy>),
    OrderMore(Vec<OrderBy>),
    Group(Vec<String>),
    JoinTable(Join),
}

impl<E> Condition<E> {
    pub fn kind(&self) -> ConditionKind {
        match self {
            Condition::Where(_) => ConditionKind::Where,
            Condition::Or(_) => ConditionKind::Or,
            Condition::Exclude(_) => ConditionKind::Exclude,
            Condition::Select(_) => ConditionKind::Select,
            Condition::SelectAll => ConditionKind::SelectAll,
            Condition::Limit(_) => ConditionKind::Limit,
            Condition::Offset(_) => ConditionKind::Offset,
            Condition::Order(_) => ConditionKind::Order,
            Condition::OrderMore(_) => ConditionKind::OrderMore,
            Condition::Group(_) => ConditionKind::Group,
            Condition::JoinTable(_) => ConditionKind::JoinTable,
        }
    }

    /// Same payload under the opposite tag (see [`ConditionKind::opposite`])
    pub fn negated(self) -> Self {
        match (self.kind().opposite(), self) {
            (ConditionKind::Exclude, Condition::Where(predicate)) => Condition::Exclude(predicate),
            (ConditionKind::Where, Condition::Exclude(predicate)) => Condition::Where(predicate),
            (_, other) => other,
        }
    }
}
