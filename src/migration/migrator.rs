//! Migrator: discovery, validation and execution of SQL migrations

use crate::config::DatabaseConfig;
use crate::migration::file::discover_migrations;
use crate::migration::state_table::{
    applied_migrations, initialize_state_table, record_applied, remove_applied,
};
use crate::migration::{checksum, MigrationError, MigrationFile, MigrationStatus};
use crate::sql::Executor;
use regex::Regex;
use sea_query::Values;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

fn validate_database_name(database: &str) -> Result<(), MigrationError> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
        .map_err(|e| MigrationError::InvalidFormat(format!("Invalid regex: {e}")))?;
    if re.is_match(database) {
        Ok(())
    } else {
        Err(MigrationError::InvalidDatabaseName(database.to_string()))
    }
}

/// `CREATE DATABASE`, issued through a connection to another database
pub fn create(admin: &dyn Executor, database: &str) -> Result<(), MigrationError> {
    validate_database_name(database)?;
    log::info!("creating database '{database}'");
    admin.execute(&format!("CREATE DATABASE \"{database}\""), &Values(Vec::new()))?;
    Ok(())
}

/// `DROP DATABASE IF EXISTS`, issued through a connection to another database
pub fn drop(admin: &dyn Executor, database: &str) -> Result<(), MigrationError> {
    validate_database_name(database)?;
    log::info!("dropping database '{database}'");
    admin.execute(&format!("DROP DATABASE IF EXISTS \"{database}\""), &Values(Vec::new()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

/// Runs the SQL migrations found in one directory
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations_dir: PathBuf,
}

impl Migrator {
    pub fn new(migrations_dir: impl AsRef<Path>) -> Self {
        Self {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(&config.migrations_dir)
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Migration files sorted by version
    pub fn discover_migrations(&self) -> Result<Vec<MigrationFile>, MigrationError> {
        discover_migrations(&self.migrations_dir)
    }

    /// Applied vs pending migrations.
    ///
    /// Fails if an applied migration's file changed or disappeared.
    pub fn status(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let files = self.discover_migrations()?;
        let applied = applied_migrations(executor)?;

        for record in &applied {
            match files.iter().find(|f| f.version == record.version) {
                Some(file) => checksum::validate_checksum(
                    record.version,
                    &record.name,
                    &record.checksum,
                    &file.checksum,
                )?,
                None => {
                    return Err(MigrationError::MissingFile {
                        version: record.version,
                        name: record.name.clone(),
                    })
                }
            }
        }

        let pending = files
            .into_iter()
            .filter(|f| !applied.iter().any(|r| r.version == f.version))
            .collect();

        Ok(MigrationStatus::new(applied, pending))
    }

    /// Latest applied version, `None` on a fresh database
    pub fn version(&self, executor: &dyn Executor) -> Result<Option<i64>, MigrationError> {
        initialize_state_table(executor)?;
        Ok(applied_migrations(executor)?.iter().map(|m| m.version).max())
    }

    /// Bring the schema to `target`.
    ///
    /// Without a target every pending migration is applied. With one,
    /// pending migrations up to and including it are applied and applied
    /// migrations above it are rolled back, newest first. `Some(0)` rolls
    /// everything back. Returns the number of migrations run.
    pub fn migrate(&self, executor: &dyn Executor, target: Option<i64>) -> Result<usize, MigrationError> {
        let status = self.status(executor)?;

        let target = match target {
            None => i64::MAX,
            Some(0) => 0,
            Some(version) => {
                let known = status.pending.iter().any(|f| f.version == version)
                    || status.applied.iter().any(|r| r.version == version);
                if !known {
                    return Err(MigrationError::InvalidVersion(version));
                }
                version
            }
        };

        let mut count = 0;

        let files = self.discover_migrations()?;
        let mut rollback: Vec<&MigrationFile> = status
            .applied
            .iter()
            .filter(|r| r.version > target)
            .filter_map(|r| files.iter().find(|f| f.version == r.version))
            .collect();
        rollback.sort_by_key(|f| std::cmp::Reverse(f.version));
        for file in rollback {
            self.run(executor, file, Direction::Down)?;
            count += 1;
        }

        for file in status.pending.iter().filter(|f| f.version <= target) {
            self.run(executor, file, Direction::Up)?;
            count += 1;
        }

        if count == 0 {
            log::info!("schema is up to date");
        }
        Ok(count)
    }

    /// Run one migration inside a transaction and update the state table
    fn run(&self, executor: &dyn Executor, file: &MigrationFile, direction: Direction) -> Result<(), MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::migration_span(file.version, direction.as_str()).entered();

        let sql = match direction {
            Direction::Up => &file.up,
            Direction::Down => &file.down,
        };
        if direction == Direction::Down && sql.is_empty() {
            return Err(MigrationError::ExecutionFailed {
                version: file.version,
                name: file.name.clone(),
                error: "migration has no '-- migrate:down' section".to_string(),
            });
        }

        let start = Instant::now();
        let none = Values(Vec::new());
        executor.execute("BEGIN", &none)?;

        let result = executor.batch_execute(sql).map_err(MigrationError::from).and_then(|()| {
            match direction {
                Direction::Up => record_applied(executor, file),
                Direction::Down => remove_applied(executor, file.version),
            }
        });

        match result {
            Ok(()) => {
                executor.execute("COMMIT", &none)?;
                log::info!(
                    "migrated {} m{}_{} in {:?}",
                    direction.as_str(),
                    file.version,
                    file.name,
                    start.elapsed()
                );
                Ok(())
            }
            Err(err) => {
                if let Err(rollback) = executor.execute("ROLLBACK", &none) {
                    log::warn!("rollback of m{}_{} failed: {rollback}", file.version, file.name);
                }
                Err(MigrationError::ExecutionFailed {
                    version: file.version,
                    name: file.name.clone(),
                    error: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::record::record;
    use crate::sql::executor::mock::MockExecutor;
    use serde_json::json;
    use std::fs;

    const FIRST: &str = "-- migrate:up\nCREATE TABLE a (id int);\n-- migrate:down\nDROP TABLE a;\n";
    const SECOND: &str = "-- migrate:up\nCREATE TABLE b (id int);\n-- migrate:down\nDROP TABLE b;\n";

    fn migrations() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("m20240101000000_create_a.sql"), FIRST).unwrap();
        fs::write(dir.path().join("m20240102000000_create_b.sql"), SECOND).unwrap();
        dir
    }

    fn applied(version: i64, name: &str, content: &str) -> crate::record::Record {
        record([
            ("version", json!(version)),
            ("name", json!(name)),
            ("checksum", json!(checksum::checksum(content))),
            ("applied_at", json!("2024-01-01T00:00:00+00:00")),
        ])
    }

    fn statements(executor: &MockExecutor) -> Vec<String> {
        executor
            .captured_sql()
            .into_iter()
            .filter(|sql| !sql.contains("CREATE TABLE IF NOT EXISTS") && !sql.starts_with("SELECT"))
            .collect()
    }

    #[test]
    fn test_migrate_applies_pending_in_order() {
        let dir = migrations();
        let executor = MockExecutor::new();
        executor.respond(vec![]);

        let count = Migrator::new(dir.path()).migrate(&executor, None).unwrap();

        assert_eq!(count, 2);
        let sql = statements(&executor);
        assert_eq!(sql[0], "BEGIN");
        assert_eq!(sql[1], "CREATE TABLE a (id int);");
        assert!(sql[2].starts_with(r#"INSERT INTO "tidepool_migrations""#));
        assert_eq!(sql[3], "COMMIT");
        assert_eq!(sql[5], "CREATE TABLE b (id int);");
    }

    #[test]
    fn test_migrate_to_target_rolls_back_newer() {
        let dir = migrations();
        let executor = MockExecutor::new();
        executor.respond(vec![
            applied(20240101000000, "create_a", FIRST),
            applied(20240102000000, "create_b", SECOND),
        ]);

        let count = Migrator::new(dir.path())
            .migrate(&executor, Some(20240101000000))
            .unwrap();

        assert_eq!(count, 1);
        let sql = statements(&executor);
        assert_eq!(sql[1], "DROP TABLE b;");
        assert!(sql[2].starts_with(r#"DELETE FROM "tidepool_migrations""#));
    }

    #[test]
    fn test_unknown_target_version() {
        let dir = migrations();
        let executor = MockExecutor::new();
        executor.respond(vec![]);

        let err = Migrator::new(dir.path()).migrate(&executor, Some(42)).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidVersion(42)));
    }

    #[test]
    fn test_checksum_mismatch_blocks_migration() {
        let dir = migrations();
        let executor = MockExecutor::new();
        executor.respond(vec![applied(20240101000000, "create_a", "edited")]);

        let err = Migrator::new(dir.path()).migrate(&executor, None).unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { version: 20240101000000, .. }));
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let dir = migrations();
        let executor = MockExecutor::new();
        executor.respond(vec![]);
        executor.fail_on("CREATE TABLE b", EngineError::new("42601", "syntax error"));

        let err = Migrator::new(dir.path()).migrate(&executor, None).unwrap_err();

        assert!(matches!(err, MigrationError::ExecutionFailed { version: 20240102000000, .. }));
        assert!(err.to_string().contains("syntax error"));
        assert_eq!(executor.last_sql(), "ROLLBACK");
    }

    #[test]
    fn test_version_and_status() {
        let dir = migrations();
        let executor = MockExecutor::new();
        executor.respond(vec![applied(20240101000000, "create_a", FIRST)]);
        executor.respond(vec![applied(20240101000000, "create_a", FIRST)]);

        let migrator = Migrator::new(dir.path());
        assert_eq!(migrator.version(&executor).unwrap(), Some(20240101000000));

        let status = migrator.status(&executor).unwrap();
        assert!(!status.is_up_to_date());
        assert_eq!(status.next_pending_version(), Some(20240102000000));
    }

    #[test]
    fn test_create_and_drop_validate_name() {
        let executor = MockExecutor::new();
        create(&executor, "app_test").unwrap();
        drop(&executor, "app_test").unwrap();
        assert_eq!(
            executor.captured_sql(),
            vec![r#"CREATE DATABASE "app_test""#, r#"DROP DATABASE IF EXISTS "app_test""#]
        );

        assert!(matches!(
            create(&executor, "app\"; DROP"),
            Err(MigrationError::InvalidDatabaseName(_))
        ));
    }
}
