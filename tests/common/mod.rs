//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tidepool::memory::{MemoryScope, MemoryStore, TableOptions};
use tidepool::scope::{Aggregate, TransactionOptions};
use tidepool::{
    Collection, EngineError, Entity, Join, ModelError, OrderBy, Predicate, Record, Repository,
    Scope, SerdeMapping, Value,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn aged(name: &str, age: i64) -> Self {
        Self {
            age: Some(age),
            ..Self::new(name)
        }
    }
}

impl Entity for Author {
    fn id(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn created_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
        Some(&mut self.created_at)
    }

    fn updated_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
        Some(&mut self.updated_at)
    }
}

pub type Authors = Repository<MemoryScope, SerdeMapping<Author>>;

/// Store with an `authors` table whose `name` is unique
pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.create_table_with("authors", TableOptions::new().unique("name").not_null("name"));
    store
}

pub fn authors(store: &MemoryStore) -> Authors {
    Repository::new(store.collection::<Author>("authors"))
}

/// Repository holding S, MG and L, created in that order
pub fn seeded() -> (MemoryStore, Authors) {
    let store = store();
    let repo = authors(&store);
    for (name, age) in [("S", 30), ("MG", 40), ("L", 50)] {
        repo.create(Author::aged(name, age)).unwrap();
    }
    (store, repo)
}

pub fn names(authors: &[Author]) -> Vec<&str> {
    authors.iter().map(|a| a.name.as_str()).collect()
}

/// Scope that records which primitives were applied, in order
#[derive(Debug, Clone)]
pub struct RecordingScope {
    table: String,
    pub calls: Arc<Mutex<Vec<String>>>,
    insert_result: Arc<Mutex<Result<Value, EngineError>>>,
}

impl RecordingScope {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            insert_result: Arc::new(Mutex::new(Ok(Value::from(42)))),
        }
    }

    /// Make `insert` fail with `err`
    pub fn failing_insert(self, err: EngineError) -> Self {
        *self.insert_result.lock().unwrap() = Err(err);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(self, call: impl Into<String>) -> Self {
        self.calls.lock().unwrap().push(call.into());
        self
    }
}

impl Scope for RecordingScope {
    type Expr = String;

    fn table_name(&self) -> &str {
        &self.table
    }

    fn filter(self, _: Predicate<String>) -> Self {
        self.record("filter")
    }

    fn exclude(self, _: Predicate<String>) -> Self {
        self.record("exclude")
    }

    fn or(self, _: Predicate<String>) -> Self {
        self.record("or")
    }

    fn select(self, _: &[String]) -> Self {
        self.record("select")
    }

    fn select_all(self) -> Self {
        self.record("select_all")
    }

    fn limit(self, limit: u64) -> Self {
        self.record(format!("limit {limit}"))
    }

    fn offset(self, offset: u64) -> Self {
        self.record(format!("offset {offset}"))
    }

    fn order(self, _: &[OrderBy]) -> Self {
        self.record("order")
    }

    fn order_more(self, _: &[OrderBy]) -> Self {
        self.record("order_more")
    }

    fn group(self, _: &[String]) -> Self {
        self.record("group")
    }

    fn join_table(self, join: &Join) -> Self {
        self.record(format!("join {}", join.table))
    }

    fn rows(&self) -> Result<Vec<Record>, EngineError> {
        Ok(Vec::new())
    }

    fn insert(&self, _: Record, _: &str) -> Result<Value, EngineError> {
        self.insert_result.lock().unwrap().clone()
    }

    fn update(&self, _: Record) -> Result<u64, EngineError> {
        Ok(1)
    }

    fn delete(&self) -> Result<u64, EngineError> {
        Ok(0)
    }

    fn aggregate(&self, _: Aggregate, _: &str) -> Result<Option<Value>, EngineError> {
        Ok(None)
    }

    fn count(&self) -> Result<u64, EngineError> {
        Ok(0)
    }

    fn transaction<T, F>(&self, _: &TransactionOptions, f: F) -> Result<T, ModelError>
    where
        F: FnOnce() -> Result<T, ModelError>,
    {
        f()
    }
}

pub fn recording(table: &str) -> Collection<RecordingScope, SerdeMapping<Author>> {
    Collection::new(RecordingScope::new(table), SerdeMapping::new(table))
}
