//! Lazily evaluated, composable queries.
//!
//! A [`Query`] is an ordered list of [`Condition`]s plus the base
//! [`Collection`] they will be applied to. Chaining methods only append to the
//! list; nothing reaches the engine until a terminal method (`all`, `count`,
//! `sum`, ...) folds the conditions onto the base, strictly left to right.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use tidepool::memory::MemoryStore;
//! use tidepool::{Filter, Query};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Author {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! let store = MemoryStore::new();
//! store.create_table("authors");
//! for name in ["S", "MG", "L"] {
//!     store.insert_row("authors", json!({ "name": name })).unwrap();
//! }
//!
//! let query = Query::new(store.collection::<Author>("authors"))
//!     .filter(Filter::new().eq("name", json!(["L", "MG"])))
//!     .order(["name"]);
//!
//! let names: Vec<String> = query.all().unwrap().into_iter().map(|a| a.name).collect();
//! assert_eq!(names, vec!["L", "MG"]);
//! ```

use crate::collection::Collection;
use crate::condition::{Condition, ConditionKind, Join, JoinKind, JoinOptions, OrderBy, Predicate};
use crate::error::ModelError;
use crate::inflection::singularize;
use crate::mapping::Mapping;
use crate::record::Value;
use crate::scope::{Aggregate, Scope};
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// Source of named query fragments.
///
/// A query consults its context in [`Query::fragment`]. The returned query is
/// built on `base` and its conditions are appended to the caller's.
pub trait FragmentProvider<S, M>: Send + Sync
where
    S: Scope,
    M: Mapping,
{
    /// Build the fragment called `name`, or `None` if the name is unknown
    fn resolve(&self, name: &str, base: &Collection<S, M>, args: &[Value]) -> Option<Query<S, M>>;
}

/// Ordered accumulation of conditions over a base collection
pub struct Query<S, M>
where
    S: Scope,
    M: Mapping,
{
    base: Collection<S, M>,
    conditions: Vec<Condition<S::Expr>>,
    context: Option<Arc<dyn FragmentProvider<S, M>>>,
    error: Option<ModelError>,
}

impl<S, M> Clone for Query<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            conditions: self.conditions.clone(),
            context: self.context.clone(),
            error: self.error.clone(),
        }
    }
}

impl<S, M> fmt::Debug for Query<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("conditions", &self.kinds())
            .field("context", &self.context.is_some())
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S, M> Query<S, M>
where
    S: Scope,
    M: Mapping,
{
    /// Query over the whole of `base`
    pub fn new(base: Collection<S, M>) -> Self {
        Self {
            base,
            conditions: Vec::new(),
            context: None,
            error: None,
        }
    }

    /// Attach the context consulted by [`fragment`](Self::fragment)
    #[must_use]
    pub fn with_context(mut self, context: Arc<dyn FragmentProvider<S, M>>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn base(&self) -> &Collection<S, M> {
        &self.base
    }

    pub fn conditions(&self) -> &[Condition<S::Expr>] {
        &self.conditions
    }

    /// Tags of the accumulated conditions, in order
    pub fn kinds(&self) -> Vec<ConditionKind> {
        self.conditions.iter().map(Condition::kind).collect()
    }

    fn push(mut self, condition: Condition<S::Expr>) -> Self {
        self.conditions.push(condition);
        self
    }

    fn push_filter(
        mut self,
        method: &str,
        predicate: Predicate<S::Expr>,
        wrap: fn(Predicate<S::Expr>) -> Condition<S::Expr>,
    ) -> Self {
        if predicate.is_empty() {
            log::warn!("{method} called without a predicate on '{}'", self.base.table_name());
            if self.error.is_none() {
                self.error = Some(ModelError::Argument(format!(
                    "{method} requires a non-empty predicate or an expression"
                )));
            }
            return self;
        }
        self.push(wrap(predicate))
    }

    /// Keep rows matching the predicate.
    ///
    /// An array value means "one of these values", a [`Criterion::Between`](crate::Criterion)
    /// an inclusive range. An empty filter is an argument error, reported by
    /// the next terminal method.
    #[must_use]
    pub fn filter(self, predicate: impl Into<Predicate<S::Expr>>) -> Self {
        self.push_filter("filter", predicate.into(), Condition::Where)
    }

    /// Alias for [`filter`](Self::filter)
    #[must_use]
    pub fn and(self, predicate: impl Into<Predicate<S::Expr>>) -> Self {
        self.filter(predicate)
    }

    /// Keep rows matching an engine expression
    #[must_use]
    pub fn filter_expr(self, expr: S::Expr) -> Self {
        self.push(Condition::Where(Predicate::Expr(expr)))
    }

    /// Drop rows matching the predicate
    #[must_use]
    pub fn exclude(self, predicate: impl Into<Predicate<S::Expr>>) -> Self {
        self.push_filter("exclude", predicate.into(), Condition::Exclude)
    }

    /// Alias for [`exclude`](Self::exclude)
    #[must_use]
    pub fn not(self, predicate: impl Into<Predicate<S::Expr>>) -> Self {
        self.exclude(predicate)
    }

    #[must_use]
    pub fn exclude_expr(self, expr: S::Expr) -> Self {
        self.push(Condition::Exclude(Predicate::Expr(expr)))
    }

    /// Also keep rows matching the predicate.
    ///
    /// Without an earlier filter this behaves as [`filter`](Self::filter).
    #[must_use]
    pub fn or(self, predicate: impl Into<Predicate<S::Expr>>) -> Self {
        self.push_filter("or", predicate.into(), Condition::Or)
    }

    #[must_use]
    pub fn or_expr(self, expr: S::Expr) -> Self {
        self.push(Condition::Or(Predicate::Expr(expr)))
    }

    /// Restrict the projected columns; a later call replaces an earlier one
    #[must_use]
    pub fn select<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.push(Condition::Select(columns.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub fn limit(self, limit: u64) -> Self {
        self.push(Condition::Limit(limit))
    }

    #[must_use]
    pub fn offset(self, offset: u64) -> Self {
        self.push(Condition::Offset(offset))
    }

    fn has_ordering(&self) -> bool {
        self.conditions.iter().any(|condition| condition.kind().is_ordering())
    }

    fn push_ordering(self, ordering: Vec<OrderBy>) -> Self {
        if self.has_ordering() {
            self.push(Condition::OrderMore(ordering))
        } else {
            self.push(Condition::Order(ordering))
        }
    }

    /// Order ascending by the given columns.
    ///
    /// The first ordering of a chain replaces any engine default; later ones
    /// are appended after it.
    #[must_use]
    pub fn order<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.push_ordering(columns.into_iter().map(OrderBy::asc).collect())
    }

    /// Alias for [`order`](Self::order)
    #[must_use]
    pub fn asc<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.order(columns)
    }

    /// Order descending, one condition per column
    #[must_use]
    pub fn reverse_order<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        columns
            .into_iter()
            .fold(self, |query, column| query.push_ordering(vec![OrderBy::desc(column)]))
    }

    /// Alias for [`reverse_order`](Self::reverse_order)
    #[must_use]
    pub fn desc<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.reverse_order(columns)
    }

    #[must_use]
    pub fn group<I, C>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.push(Condition::Group(columns.into_iter().map(Into::into).collect()))
    }

    /// Inner join `table`.
    ///
    /// Projects every column of the base table first, then joins on
    /// `<table>.<key> = <foreign_key>`. `key` defaults to the base identity and
    /// `foreign_key` to `<base_table>.<singular table>_id`.
    #[must_use]
    pub fn join(self, table: impl Into<String>, options: JoinOptions) -> Self {
        self.push_join(JoinKind::Inner, table.into(), options)
    }

    #[must_use]
    pub fn left_join(self, table: impl Into<String>, options: JoinOptions) -> Self {
        self.push_join(JoinKind::Left, table.into(), options)
    }

    fn push_join(self, kind: JoinKind, table: String, options: JoinOptions) -> Self {
        let base_table = self.base.table_name();
        let key = options.key.unwrap_or_else(|| self.base.identity().to_string());
        let foreign_key = options
            .foreign_key
            .unwrap_or_else(|| format!("{base_table}.{}_id", singularize(&table)));

        self.push(Condition::SelectAll).push(Condition::JoinTable(Join {
            kind,
            table,
            key,
            foreign_key,
        }))
    }

    /// Swap every top-level filter for its opposite (keep ↔ drop).
    ///
    /// Only meaningful for queries made of `filter`/`exclude` conditions;
    /// every other condition is carried over unchanged. Negating twice gives
    /// back the original query.
    #[must_use]
    pub fn negate(mut self) -> Self {
        self.conditions = self.conditions.into_iter().map(Condition::negated).collect();
        self
    }

    /// Negated copy, leaving `self` untouched
    #[must_use]
    pub fn inverted(&self) -> Self {
        self.clone().negate()
    }

    /// Append the conditions of `other` after this query's own
    #[must_use]
    pub fn merge(mut self, other: &Query<S, M>) -> Self {
        self.conditions.extend(other.conditions.iter().cloned());
        if self.error.is_none() {
            self.error = other.error.clone();
        }
        self
    }

    /// Extend this query with the named fragment from its context
    pub fn fragment(&self, name: &str, args: &[Value]) -> Result<Self, ModelError> {
        let fragment = self
            .context
            .as_ref()
            .and_then(|context| context.resolve(name, &self.base, args))
            .ok_or_else(|| ModelError::UnknownFragment(name.to_string()))?;

        Ok(self.clone().merge(&fragment))
    }

    /// Fold the conditions onto the base collection.
    ///
    /// Pure: the base is left as it was and calling this twice gives two
    /// independent, equal collections.
    pub fn scoped(&self) -> Collection<S, M> {
        self.conditions
            .iter()
            .fold(self.base.clone(), |collection, condition| collection.apply(condition))
    }

    /// Alias for [`scoped`](Self::scoped)
    pub fn run(&self) -> Collection<S, M> {
        self.scoped()
    }

    fn checked(&self) -> Result<Collection<S, M>, ModelError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(self.scoped()),
        }
    }

    /// Materialize the matching entities.
    ///
    /// Engine failures surface as [`ModelError::InvalidQuery`].
    pub fn all(&self) -> Result<Vec<M::Entity>, ModelError> {
        let collection = self.checked()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::resolve_query_span(self.base.table_name(), self.conditions.len())
            .entered();

        collection.to_a().map_err(|err| match err {
            ModelError::Engine(engine) => ModelError::InvalidQuery(engine.message),
            other => other,
        })
    }

    /// First entity in the query's ordering, identity breaking ties
    pub fn first(&self) -> Result<Option<M::Entity>, ModelError> {
        let identity = self.base.identity().to_string();
        Ok(self.clone().order([identity]).limit(1).all()?.into_iter().next())
    }

    /// Entity with the highest identity after the query's own ordering
    pub fn last(&self) -> Result<Option<M::Entity>, ModelError> {
        let identity = self.base.identity().to_string();
        Ok(self.clone().reverse_order([identity]).limit(1).all()?.into_iter().next())
    }

    fn aggregate(&self, aggregate: Aggregate, column: &str) -> Result<Option<Value>, ModelError> {
        self.checked()?.aggregate(aggregate, column)
    }

    /// `None` when nothing matches
    pub fn sum(&self, column: &str) -> Result<Option<Value>, ModelError> {
        self.aggregate(Aggregate::Sum, column)
    }

    pub fn average(&self, column: &str) -> Result<Option<Value>, ModelError> {
        self.aggregate(Aggregate::Avg, column)
    }

    /// Alias for [`average`](Self::average)
    pub fn avg(&self, column: &str) -> Result<Option<Value>, ModelError> {
        self.average(column)
    }

    pub fn max(&self, column: &str) -> Result<Option<Value>, ModelError> {
        self.aggregate(Aggregate::Max, column)
    }

    pub fn min(&self, column: &str) -> Result<Option<Value>, ModelError> {
        self.aggregate(Aggregate::Min, column)
    }

    /// max - min
    pub fn interval(&self, column: &str) -> Result<Option<Value>, ModelError> {
        self.aggregate(Aggregate::Interval, column)
    }

    /// `(min, max)`
    pub fn range(&self, column: &str) -> Result<Option<(Value, Value)>, ModelError> {
        let collection = self.checked()?;
        let min = collection.aggregate(Aggregate::Min, column)?;
        let max = collection.aggregate(Aggregate::Max, column)?;
        Ok(min.zip(max))
    }

    pub fn count(&self) -> Result<u64, ModelError> {
        self.checked()?.count()
    }

    pub fn exists(&self) -> Result<bool, ModelError> {
        Ok(self.count()? > 0)
    }
}
