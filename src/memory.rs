//! In-memory engine.
//!
//! Tables live in a [`MemoryStore`] shared behind an `Arc<RwLock<..>>`. A
//! [`MemoryScope`] is a lazy plan over one table and implements [`Scope`],
//! so repositories and queries run unchanged against it. Constraint failures
//! carry the native codes registered by [`register_error_kinds`].
//!
//! [`Scope`]: crate::Scope

mod eval;
mod scope;

pub use scope::{Matcher, MemoryScope};

use crate::collection::Collection;
use crate::error::{registry, EngineError, ErrorKind};
use crate::mapping::SerdeMapping;
use crate::record::{Record, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Once, PoisonError, RwLock};

/// Native code raised when a unique column would hold a duplicate
pub const UNIQUE_VIOLATION: &str = "memory.unique_violation";
/// Native code raised when a not-null column would hold null
pub const NOT_NULL_VIOLATION: &str = "memory.not_null_violation";

static REGISTER: Once = Once::new();

/// Register the memory engine's constraint codes with the error registry.
///
/// Runs once per process; [`MemoryStore::new`] calls it.
pub fn register_error_kinds() {
    REGISTER.call_once(|| {
        registry::register(UNIQUE_VIOLATION, ErrorKind::UniqueConstraintViolation);
        registry::register(NOT_NULL_VIOLATION, ErrorKind::NotNullConstraintViolation);
    });
}

/// Table definition for [`MemoryStore::create_table_with`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOptions {
    identity: String,
    unique: Vec<String>,
    not_null: Vec<String>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            identity: "id".to_string(),
            unique: Vec::new(),
            not_null: Vec::new(),
        }
    }
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn identity(mut self, column: impl Into<String>) -> Self {
        self.identity = column.into();
        self
    }

    #[must_use]
    pub fn unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    #[must_use]
    pub fn not_null(mut self, column: impl Into<String>) -> Self {
        self.not_null.push(column.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
    pub(crate) rows: Vec<Record>,
    sequence: i64,
    options: TableOptions,
}

impl Table {
    fn new(options: TableOptions) -> Self {
        Self {
            rows: Vec::new(),
            sequence: 0,
            options,
        }
    }

    /// Check not-null and unique constraints (identity included) over `rows`
    pub(crate) fn check_constraints(&self, table: &str, rows: &[Record]) -> Result<(), EngineError> {
        for column in &self.options.not_null {
            if rows.iter().any(|row| row.get(column).map_or(true, Value::is_null)) {
                return Err(EngineError::new(
                    NOT_NULL_VIOLATION,
                    format!(
                        "null value in column \"{column}\" of relation \"{table}\" violates not-null constraint"
                    ),
                ));
            }
        }

        let identity = std::iter::once(&self.options.identity);
        for column in identity.chain(self.options.unique.iter()) {
            let mut seen: Vec<&Value> = Vec::new();
            for value in rows.iter().filter_map(|row| row.get(column)).filter(|v| !v.is_null()) {
                if seen.iter().any(|other| eval::equal(other, value)) {
                    return Err(EngineError::new(
                        UNIQUE_VIOLATION,
                        format!(
                            "duplicate key value violates unique constraint \"{table}_{column}_key\": ({column})=({value})"
                        ),
                    ));
                }
                seen.push(value);
            }
        }

        Ok(())
    }
}

pub(crate) type Tables = HashMap<String, Table>;

/// Shared, thread-safe set of in-memory tables.
///
/// Cloning is cheap and every clone sees the same tables.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.read(|tables| tables.keys().cloned().collect());
        names.sort();
        f.debug_struct("MemoryStore").field("tables", &names).finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        register_error_kinds();
        Self {
            tables: Arc::new(RwLock::new(Tables::new())),
        }
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let guard = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Create `name` with an `id` identity and no constraints
    pub fn create_table(&self, name: impl Into<String>) {
        self.create_table_with(name, TableOptions::default());
    }

    /// Create (or reset) a table
    pub fn create_table_with(&self, name: impl Into<String>, options: TableOptions) {
        let name = name.into();
        log::debug!("memory: create table '{name}' ({options:?})");
        self.write(|tables| tables.insert(name, Table::new(options)));
    }

    pub fn drop_table(&self, name: &str) -> bool {
        self.write(|tables| tables.remove(name).is_some())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.read(|tables| tables.contains_key(name))
    }

    /// Identity column of `table`, `id` when the table is unknown
    pub fn identity(&self, table: &str) -> String {
        self.read(|tables| {
            tables
                .get(table)
                .map_or_else(|| "id".to_string(), |t| t.options.identity.clone())
        })
    }

    /// Insert a raw row (a JSON object), returning its identity
    pub fn insert_row(&self, table: &str, row: Value) -> Result<Value, EngineError> {
        match row {
            Value::Object(record) => {
                let identity = self.identity(table);
                self.insert_record(table, record, &identity)
            }
            other => Err(EngineError::new(
                "memory.invalid_row",
                format!("row for \"{table}\" must be an object, got {other}"),
            )),
        }
    }

    /// Stored rows of `table`, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.read(|tables| tables.get(table).map(|t| t.rows.clone()).unwrap_or_default())
    }

    pub(crate) fn insert_record(
        &self,
        table: &str,
        mut record: Record,
        identity: &str,
    ) -> Result<Value, EngineError> {
        self.write(|tables| {
            let stored = tables.get_mut(table).ok_or_else(|| {
                EngineError::new(
                    "memory.undefined_table",
                    format!("relation \"{table}\" does not exist"),
                )
            })?;

            let id = match record.get(identity) {
                Some(id) if !id.is_null() => id.clone(),
                _ => Value::from(stored.sequence + 1),
            };
            record.insert(identity.to_string(), id.clone());

            let mut rows = stored.rows.clone();
            rows.push(record);
            stored.check_constraints(table, &rows)?;

            if let Some(n) = id.as_i64() {
                stored.sequence = stored.sequence.max(n);
            }
            stored.rows = rows;
            log::debug!("memory: inserted into '{table}' with {identity} = {id}");
            Ok(id)
        })
    }

    pub(crate) fn snapshot(&self) -> Tables {
        self.read(Tables::clone)
    }

    pub(crate) fn restore(&self, tables: Tables) {
        self.write(|current| *current = tables);
    }

    /// Unfiltered scope over `table`
    pub fn scope(&self, table: impl Into<String>) -> MemoryScope {
        MemoryScope::new(self.clone(), table)
    }

    /// Collection of serde entities stored in `table`
    pub fn collection<E>(&self, table: &str) -> Collection<MemoryScope, SerdeMapping<E>>
    where
        E: Serialize + DeserializeOwned,
    {
        let mapping = SerdeMapping::with_identity(table, self.identity(table));
        Collection::new(self.scope(table), mapping)
    }
}
