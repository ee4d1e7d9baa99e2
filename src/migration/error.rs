//! Migration-specific error types

use crate::error::EngineError;

/// Migration-specific errors
#[derive(Debug)]
pub enum MigrationError {
    /// Database execution error
    Database(EngineError),
    /// Migrations directory or file could not be read
    FileNotFound(String),
    /// Invalid migration file name or content
    InvalidFormat(String),
    /// Applied migration whose file changed since
    ChecksumMismatch {
        version: i64,
        name: String,
        stored: String,
        current: String,
    },
    /// Migration failed during execution and was rolled back
    ExecutionFailed {
        version: i64,
        name: String,
        error: String,
    },
    /// Target version matches no migration file
    InvalidVersion(i64),
    /// Applied migration whose file is gone
    MissingFile { version: i64, name: String },
    /// Database name that is not a plain identifier
    InvalidDatabaseName(String),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::FileNotFound(path) => write!(f, "Migration file not found: {path}"),
            MigrationError::InvalidFormat(msg) => write!(f, "Invalid migration format: {msg}"),
            MigrationError::ChecksumMismatch {
                version,
                name,
                stored,
                current,
            } => write!(
                f,
                "Migration '{name}' (version {version}) has been modified after being applied.\n\
                 Stored checksum: {stored}\n\
                 Current checksum: {current}"
            ),
            MigrationError::ExecutionFailed { version, name, error } => write!(
                f,
                "Migration '{name}' (version {version}) failed during execution: {error}"
            ),
            MigrationError::InvalidVersion(version) => {
                write!(f, "Invalid migration version: {version}")
            }
            MigrationError::MissingFile { version, name } => write!(
                f,
                "Applied migration file not found: m{version}_{name}.sql"
            ),
            MigrationError::InvalidDatabaseName(name) => {
                write!(f, "Invalid database name: {name:?}")
            }
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for MigrationError {
    fn from(error: EngineError) -> Self {
        MigrationError::Database(error)
    }
}
