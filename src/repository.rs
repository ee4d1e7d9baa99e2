//! Storage-agnostic entry point for reading and writing entities.

use crate::collection::Collection;
use crate::command::Command;
use crate::condition::{Filter, Predicate};
use crate::error::ModelError;
use crate::mapping::{Entity, Mapping};
use crate::query::{FragmentProvider, Query};
use crate::record::Value;
use crate::scope::{Scope, TransactionOptions};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type FragmentFn<S, M> = dyn Fn(Query<S, M>, &[Value]) -> Query<S, M> + Send + Sync;

/// Named, reusable query fragments.
///
/// Each fragment receives a fresh query on the base collection and the
/// caller's arguments, and returns the extended query.
pub struct Fragments<S, M>
where
    S: Scope,
    M: Mapping,
{
    entries: HashMap<String, Arc<FragmentFn<S, M>>>,
}

impl<S, M> Default for Fragments<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S, M> Clone for Fragments<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S, M> fmt::Debug for Fragments<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Fragments").field("names", &names).finish()
    }
}

impl<S, M> Fragments<S, M>
where
    S: Scope,
    M: Mapping,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fragment` under `name`, replacing any earlier one
    pub fn insert<F>(&mut self, name: impl Into<String>, fragment: F)
    where
        F: Fn(Query<S, M>, &[Value]) -> Query<S, M> + Send + Sync + 'static,
    {
        self.entries.insert(name.into(), Arc::new(fragment));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl<S, M> FragmentProvider<S, M> for Fragments<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn resolve(&self, name: &str, base: &Collection<S, M>, args: &[Value]) -> Option<Query<S, M>> {
        let fragment = self.entries.get(name)?;
        Some(fragment(Query::new(base.clone()), args))
    }
}

/// Reads and writes entities of one mapping through an engine scope.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
/// use tidepool::memory::MemoryStore;
/// use tidepool::{Entity, Filter, Repository, Value};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Book {
///     id: Option<i64>,
///     author: String,
/// }
///
/// impl Entity for Book {
///     fn id(&self) -> Option<Value> {
///         self.id.map(Value::from)
///     }
/// }
///
/// let store = MemoryStore::new();
/// store.create_table("books");
///
/// let books = Repository::new(store.collection::<Book>("books")).with_fragment(
///     "by_author",
///     |query, args| query.filter(Filter::new().eq("author", args[0].clone())),
/// );
///
/// books.create(Book { id: None, author: "L".into() }).unwrap();
/// books.create(Book { id: None, author: "S".into() }).unwrap();
///
/// let by_l = books.query(|q| q.limit(10)).fragment("by_author", &[json!("L")]).unwrap();
/// assert_eq!(by_l.all().unwrap().len(), 1);
/// assert_eq!(books.exclude(by_l).all().unwrap()[0].author, "S");
/// ```
pub struct Repository<S, M>
where
    S: Scope,
    M: Mapping,
{
    collection: Collection<S, M>,
    fragments: Arc<Fragments<S, M>>,
}

impl<S, M> Clone for Repository<S, M>
where
    S: Scope,
    M: Mapping,
{
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            fragments: Arc::clone(&self.fragments),
        }
    }
}

impl<S, M> fmt::Debug for Repository<S, M>
where
    S: Scope + fmt::Debug,
    M: Mapping,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.collection.table_name())
            .field("fragments", &self.fragments)
            .finish()
    }
}

impl<S, M> Repository<S, M>
where
    S: Scope + 'static,
    M: Mapping + 'static,
    M::Entity: Entity,
{
    pub fn new(collection: Collection<S, M>) -> Self {
        Self {
            collection,
            fragments: Arc::new(Fragments::new()),
        }
    }

    /// Register a named fragment, usable through [`Query::fragment`] on
    /// queries built by [`query`](Self::query)
    #[must_use]
    pub fn with_fragment<F>(mut self, name: impl Into<String>, fragment: F) -> Self
    where
        F: Fn(Query<S, M>, &[Value]) -> Query<S, M> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.fragments).insert(name, fragment);
        self
    }

    pub fn collection(&self) -> &Collection<S, M> {
        &self.collection
    }

    pub fn fragments(&self) -> &Fragments<S, M> {
        &self.fragments
    }

    /// Update when the entity has an identity, create otherwise
    pub fn persist(&self, entity: M::Entity) -> Result<M::Entity, ModelError> {
        if entity.id().is_some() {
            self.update(entity)
        } else {
            self.create(entity)
        }
    }

    /// Insert a new entity.
    ///
    /// An entity that already has an identity is returned as is. Timestamps
    /// the entity exposes are filled in: `created_at` only when unset,
    /// `updated_at` always.
    pub fn create(&self, mut entity: M::Entity) -> Result<M::Entity, ModelError> {
        if entity.id().is_some() {
            return Ok(entity);
        }

        let now = Utc::now();
        if let Some(created_at) = entity.created_at_mut() {
            created_at.get_or_insert(now);
        }
        if let Some(updated_at) = entity.updated_at_mut() {
            *updated_at = Some(now);
        }

        Command::new(self.collection.clone()).create(&entity)
    }

    pub fn update(&self, mut entity: M::Entity) -> Result<M::Entity, ModelError> {
        let id = entity.id().ok_or(ModelError::NonPersistedEntity)?;

        if let Some(updated_at) = entity.updated_at_mut() {
            *updated_at = Some(Utc::now());
        }

        Command::new(self.by_identity(id)).update(&entity)
    }

    /// Delete the entity's row and hand the entity back
    pub fn delete(&self, entity: M::Entity) -> Result<M::Entity, ModelError> {
        let id = entity.id().ok_or(ModelError::NonPersistedEntity)?;
        Command::new(self.by_identity(id)).delete()?;
        Ok(entity)
    }

    /// `None` for a null id or when no row has it
    pub fn find(&self, id: impl Into<Value>) -> Result<Option<M::Entity>, ModelError> {
        let id = id.into();
        if id.is_null() {
            return Ok(None);
        }

        let identity = self.collection.identity().to_string();
        self.query(|q| q.filter(Filter::new().eq(identity, id)).limit(1))
            .all()
            .map(|entities| entities.into_iter().next())
    }

    pub fn all(&self) -> Result<Vec<M::Entity>, ModelError> {
        self.query(|q| q).all()
    }

    pub fn first(&self) -> Result<Option<M::Entity>, ModelError> {
        self.query(|q| q).first()
    }

    pub fn last(&self) -> Result<Option<M::Entity>, ModelError> {
        self.query(|q| q).last()
    }

    /// Delete every row of the collection
    pub fn clear(&self) -> Result<u64, ModelError> {
        Command::new(self.collection.clone()).clear()
    }

    /// Run `f` inside an engine transaction
    pub fn transaction<T, F>(&self, options: &TransactionOptions, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Result<T, ModelError>,
    {
        self.collection.scope().transaction(options, f)
    }

    /// Fresh query on the collection, extended by `build`.
    ///
    /// The repository's fragments are attached as the query's context.
    pub fn query<F>(&self, build: F) -> Query<S, M>
    where
        F: FnOnce(Query<S, M>) -> Query<S, M>,
    {
        let context: Arc<dyn FragmentProvider<S, M>> = self.fragments.clone();
        build(Query::new(self.collection.clone()).with_context(context))
    }

    /// Opposite of a query built from filters
    pub fn exclude(&self, query: Query<S, M>) -> Query<S, M> {
        query.negate()
    }

    fn by_identity(&self, id: Value) -> Collection<S, M> {
        let identity = self.collection.identity().to_string();
        self.collection
            .filter(Predicate::Columns(Filter::new().eq(identity, id)))
    }
}
