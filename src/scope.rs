//! The engine seam.
//!
//! A [`Scope`] is an engine's queryable, table-like view over one base table.
//! Shaping primitives take the scope by value and return the narrowed scope;
//! nothing touches storage until one of the terminal methods runs.

use crate::condition::{Join, OrderBy, Predicate};
use crate::error::{EngineError, ModelError};
use crate::record::{Record, Value};

/// Aggregate functions an engine evaluates over one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Max,
    Min,
    /// max - min
    Interval,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Interval => "interval",
        }
    }
}

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read uncommitted (PostgreSQL treats it as ReadCommitted)
    ReadUncommitted,
    /// Read committed (default)
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// PostgreSQL syntax
    pub fn to_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options forwarded to [`Scope::transaction`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// `None` keeps the engine default
    pub isolation: Option<IsolationLevel>,
    pub read_only: bool,
}

impl TransactionOptions {
    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Queryable scope provided by an engine.
///
/// # Filtering
///
/// `filter`, `exclude` and `or` combine with whatever the scope already
/// filters on: `filter` and `exclude` AND onto it, `or` ORs onto it. An `or`
/// on a scope with no filter yet behaves as `filter`.
///
/// Comparisons follow SQL's three-valued logic: testing a null column with
/// anything but IS NULL is unknown, and unknown rows are dropped by `filter`
/// and `exclude` alike.
///
/// # Ordering
///
/// `order` replaces any ordering already present, `order_more` appends.
pub trait Scope: Clone + Send + Sync + Sized {
    /// Opaque boolean expression accepted by `filter`, `exclude` and `or`
    type Expr: Clone + Send + Sync;

    /// Base table this scope reads from
    fn table_name(&self) -> &str;

    fn filter(self, predicate: Predicate<Self::Expr>) -> Self;
    fn exclude(self, predicate: Predicate<Self::Expr>) -> Self;
    fn or(self, predicate: Predicate<Self::Expr>) -> Self;
    fn select(self, columns: &[String]) -> Self;
    /// Project every column of the base table
    fn select_all(self) -> Self;
    fn limit(self, limit: u64) -> Self;
    fn offset(self, offset: u64) -> Self;
    fn order(self, ordering: &[OrderBy]) -> Self;
    fn order_more(self, ordering: &[OrderBy]) -> Self;
    fn group(self, columns: &[String]) -> Self;
    fn join_table(self, join: &Join) -> Self;

    /// Materialize the rows matched by this scope
    fn rows(&self) -> Result<Vec<Record>, EngineError>;

    /// Insert one row into the base table and return its generated identity
    fn insert(&self, record: Record, identity: &str) -> Result<Value, EngineError>;

    /// Set the record's columns on every matched row
    fn update(&self, record: Record) -> Result<u64, EngineError>;

    /// Delete every matched row
    fn delete(&self) -> Result<u64, EngineError>;

    /// `None` when no row is matched
    fn aggregate(&self, aggregate: Aggregate, column: &str) -> Result<Option<Value>, EngineError>;

    fn count(&self) -> Result<u64, EngineError>;

    /// Run `f` inside an engine transaction.
    ///
    /// Changes are kept when `f` returns `Ok` and discarded when it returns
    /// `Err`; the closure's error is returned unchanged.
    fn transaction<T, F>(&self, options: &TransactionOptions, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Result<T, ModelError>;
}
