//! # Tidepool
//!
//! Repository-based persistence for PostgreSQL on the `may` coroutine
//! runtime, with lazily evaluated, composable queries.
//!
//! - [`Repository`]: entity-level CRUD plus named query fragments.
//! - [`Query`]: an ordered list of conditions over a [`Collection`],
//!   resolved only by terminal methods.
//! - [`Command`]: writes, with engine errors translated through the
//!   [error registry](error::registry).
//! - Engines implement [`Scope`]: [`memory::MemoryScope`] for tests and
//!   embedded use, [`sql::SqlScope`] for PostgreSQL.
//! - [`migration::Migrator`] applies SQL migration files.

pub mod collection;
pub mod command;
pub mod condition;
pub mod config;
pub mod connection;
pub mod error;
mod inflection;
pub mod mapping;
pub mod memory;
pub mod migration;
pub mod query;
pub mod record;
pub mod repository;
pub mod scope;
pub mod sql;
#[cfg(feature = "tracing")]
pub mod tracing_helpers;

pub use collection::Collection;
pub use command::Command;
pub use condition::{
    Condition, ConditionKind, Criterion, Direction, Filter, Join, JoinKind, JoinOptions, OrderBy,
    Predicate,
};
pub use config::DatabaseConfig;
pub use connection::connect;
pub use error::{EngineError, ErrorKind, ModelError};
pub use mapping::{Entity, Mapping, SerdeMapping};
pub use query::{FragmentProvider, Query};
pub use record::{Record, Value};
pub use repository::{Fragments, Repository};
pub use scope::{Aggregate, IsolationLevel, Scope, TransactionOptions};
