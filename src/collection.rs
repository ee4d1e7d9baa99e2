//! Chainable proxy over an engine [`Scope`].

use crate::condition::{Condition, Join, OrderBy, Predicate};
use crate::error::ModelError;
use crate::mapping::Mapping;
use crate::record::{Record, Value};
use crate::scope::{Aggregate, Scope};
use std::fmt;
use std::sync::Arc;

/// A [`Scope`] paired with the [`Mapping`] of the entities it holds.
///
/// Every shaping method returns a new collection and leaves the receiver
/// untouched, so a collection can be narrowed in several directions from the
/// same starting point. Engine failures are returned untranslated as
/// [`ModelError::Engine`].
pub struct Collection<S, M> {
    scope: S,
    mapping: Arc<M>,
}

impl<S: Clone, M> Clone for Collection<S, M> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            mapping: Arc::clone(&self.mapping),
        }
    }
}

impl<S: fmt::Debug, M> fmt::Debug for Collection<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection").field("scope", &self.scope).finish_non_exhaustive()
    }
}

impl<S, M> Collection<S, M>
where
    S: Scope,
    M: Mapping,
{
    pub fn new(scope: S, mapping: M) -> Self {
        Self::from_parts(scope, Arc::new(mapping))
    }

    pub fn from_parts(scope: S, mapping: Arc<M>) -> Self {
        Self { scope, mapping }
    }

    pub fn scope(&self) -> &S {
        &self.scope
    }

    pub fn mapping(&self) -> &Arc<M> {
        &self.mapping
    }

    pub fn table_name(&self) -> &str {
        self.mapping.name()
    }

    pub fn identity(&self) -> &str {
        self.mapping.identity()
    }

    fn derive(&self, shape: impl FnOnce(S) -> S) -> Self {
        Self::from_parts(shape(self.scope.clone()), Arc::clone(&self.mapping))
    }

    pub fn filter(&self, predicate: Predicate<S::Expr>) -> Self {
        self.derive(|scope| scope.filter(predicate))
    }

    pub fn exclude(&self, predicate: Predicate<S::Expr>) -> Self {
        self.derive(|scope| scope.exclude(predicate))
    }

    pub fn or(&self, predicate: Predicate<S::Expr>) -> Self {
        self.derive(|scope| scope.or(predicate))
    }

    pub fn select(&self, columns: &[String]) -> Self {
        self.derive(|scope| scope.select(columns))
    }

    pub fn select_all(&self) -> Self {
        self.derive(Scope::select_all)
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.derive(|scope| scope.limit(limit))
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.derive(|scope| scope.offset(offset))
    }

    pub fn order(&self, ordering: &[OrderBy]) -> Self {
        self.derive(|scope| scope.order(ordering))
    }

    pub fn order_more(&self, ordering: &[OrderBy]) -> Self {
        self.derive(|scope| scope.order_more(ordering))
    }

    pub fn group(&self, columns: &[String]) -> Self {
        self.derive(|scope| scope.group(columns))
    }

    pub fn join_table(&self, join: &Join) -> Self {
        self.derive(|scope| scope.join_table(join))
    }

    /// Apply one accumulated condition through the primitive named by its tag
    pub fn apply(&self, condition: &Condition<S::Expr>) -> Self {
        match condition {
            Condition::Where(predicate) => self.filter(predicate.clone()),
            Condition::Or(predicate) => self.or(predicate.clone()),
            Condition::Exclude(predicate) => self.exclude(predicate.clone()),
            Condition::Select(columns) => self.select(columns),
            Condition::SelectAll => self.select_all(),
            Condition::Limit(limit) => self.limit(*limit),
            Condition::Offset(offset) => self.offset(*offset),
            Condition::Order(ordering) => self.order(ordering),
            Condition::OrderMore(ordering) => self.order_more(ordering),
            Condition::Group(columns) => self.group(columns),
            Condition::JoinTable(join) => self.join_table(join),
        }
    }

    /// Insert the entity and return it with its generated identity
    pub fn insert(&self, entity: &M::Entity) -> Result<M::Entity, ModelError> {
        let identity = self.identity().to_string();
        let mut record = self.mapping.serialize(entity)?;
        if record.get(&identity).is_some_and(Value::is_null) {
            record.remove(&identity);
        }

        let id = self.scope.insert(record.clone(), &identity)?;
        record.insert(identity, id);

        self.single(record)
    }

    /// Write the entity's columns to every row in scope.
    ///
    /// The returned entity is rebuilt from what was written; nothing is
    /// read back from the engine.
    pub fn update(&self, entity: &M::Entity) -> Result<M::Entity, ModelError> {
        let record = self.mapping.serialize(entity)?;
        let mut changes = record.clone();
        changes.remove(self.identity());

        self.scope.update(changes)?;

        self.single(record)
    }

    /// Delete every row in scope, returning the number of rows removed
    pub fn delete(&self) -> Result<u64, ModelError> {
        Ok(self.scope.delete()?)
    }

    pub fn to_a(&self) -> Result<Vec<M::Entity>, ModelError> {
        let rows = self.scope.rows()?;
        self.mapping.deserialize(rows)
    }

    pub fn rows(&self) -> Result<Vec<Record>, ModelError> {
        Ok(self.scope.rows()?)
    }

    pub fn count(&self) -> Result<u64, ModelError> {
        Ok(self.scope.count()?)
    }

    pub fn aggregate(&self, aggregate: Aggregate, column: &str) -> Result<Option<Value>, ModelError> {
        Ok(self.scope.aggregate(aggregate, column)?)
    }

    fn single(&self, record: Record) -> Result<M::Entity, ModelError> {
        self.mapping.deserialize(vec![record])?.pop().ok_or_else(|| {
            ModelError::Mapping(format!("no entity produced for '{}'", self.table_name()))
        })
    }
}
