//! Error types for tidepool.
//!
//! [`ModelError`] is the only error type callers of repositories, queries and
//! commands observe. Engines report failures as [`EngineError`], which is
//! translated at two seams only: [`Query::all`](crate::Query::all) turns it
//! into [`ModelError::InvalidQuery`], and [`Command`](crate::Command) maps it
//! through the [`registry`] into a constraint violation or
//! [`ModelError::InvalidCommand`]. Everywhere else it propagates untouched as
//! [`ModelError::Engine`].

pub mod registry;

use std::fmt;

/// Error raised by an engine (the memory store, or PostgreSQL through
/// `may_postgres`).
///
/// `code` identifies the native error class, e.g. a SQLSTATE such as `23505`
/// or `memory.unique_violation`. It is the key used by the [`registry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: String,
    pub message: String,
}

impl EngineError {
    /// Create an engine error with a native code
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an engine error that carries no native code
    pub fn other(message: impl Into<String>) -> Self {
        Self::new("", message)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

impl std::error::Error for EngineError {}

/// Kinds a write-time engine error can be translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    CheckConstraintViolation,
    ForeignKeyConstraintViolation,
    NotNullConstraintViolation,
    UniqueConstraintViolation,
    InvalidCommand,
}

impl ErrorKind {
    /// Build the [`ModelError`] of this kind, keeping the original message
    pub fn into_error(self, message: impl Into<String>) -> ModelError {
        let message = message.into();
        match self {
            ErrorKind::CheckConstraintViolation => ModelError::CheckConstraintViolation(message),
            ErrorKind::ForeignKeyConstraintViolation => {
                ModelError::ForeignKeyConstraintViolation(message)
            }
            ErrorKind::NotNullConstraintViolation => {
                ModelError::NotNullConstraintViolation(message)
            }
            ErrorKind::UniqueConstraintViolation => ModelError::UniqueConstraintViolation(message),
            ErrorKind::InvalidCommand => ModelError::InvalidCommand(message),
        }
    }
}

/// Error type returned by queries, commands and repositories
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Resolving or materializing a query failed in the engine
    InvalidQuery(String),
    /// A write failed for a reason no registered kind recognizes
    InvalidCommand(String),
    /// A CHECK constraint rejected the write
    CheckConstraintViolation(String),
    /// A FOREIGN KEY constraint rejected the write
    ForeignKeyConstraintViolation(String),
    /// A NOT NULL constraint rejected the write
    NotNullConstraintViolation(String),
    /// A UNIQUE constraint rejected the write
    UniqueConstraintViolation(String),
    /// A query method was called with invalid arguments
    Argument(String),
    /// A named query fragment could not be resolved by the query context
    UnknownFragment(String),
    /// Update or delete was called on an entity without an identity
    NonPersistedEntity,
    /// An entity could not be converted to or from a record
    Mapping(String),
    /// Untranslated engine error
    Engine(EngineError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidQuery(msg) => write!(f, "Invalid query: {msg}"),
            ModelError::InvalidCommand(msg) => write!(f, "Invalid command: {msg}"),
            ModelError::CheckConstraintViolation(msg) => {
                write!(f, "Check constraint violation: {msg}")
            }
            ModelError::ForeignKeyConstraintViolation(msg) => {
                write!(f, "Foreign key constraint violation: {msg}")
            }
            ModelError::NotNullConstraintViolation(msg) => {
                write!(f, "Not null constraint violation: {msg}")
            }
            ModelError::UniqueConstraintViolation(msg) => {
                write!(f, "Unique constraint violation: {msg}")
            }
            ModelError::Argument(msg) => write!(f, "Argument error: {msg}"),
            ModelError::UnknownFragment(name) => write!(f, "Unknown query fragment: {name}"),
            ModelError::NonPersistedEntity => {
                write!(f, "Entity has no identity and was never persisted")
            }
            ModelError::Mapping(msg) => write!(f, "Mapping error: {msg}"),
            ModelError::Engine(e) => write!(f, "Engine error: {e}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for ModelError {
    fn from(err: EngineError) -> Self {
        ModelError::Engine(err)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Mapping(err.to_string())
    }
}
