//! Migration state table management

use crate::migration::{MigrationError, MigrationFile, MigrationRecord};
use crate::sql::Executor;
use sea_query::{
    Alias, DeleteStatement, Expr, ExprTrait, InsertStatement, Order, PostgresQueryBuilder,
    SelectStatement, Values,
};

/// Name of the state tracking table
pub const STATE_TABLE: &str = "tidepool_migrations";

/// Create the `tidepool_migrations` table if it does not exist
pub fn initialize_state_table(executor: &dyn Executor) -> Result<(), MigrationError> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {STATE_TABLE} (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
    );
    executor.execute(&sql, &Values(Vec::new()))?;
    Ok(())
}

/// Applied migrations, oldest first
pub fn applied_migrations(executor: &dyn Executor) -> Result<Vec<MigrationRecord>, MigrationError> {
    let (sql, values) = SelectStatement::default()
        .columns(["version", "name", "checksum", "applied_at"].map(Alias::new))
        .from(Alias::new(STATE_TABLE))
        .order_by(Alias::new("version"), Order::Asc)
        .build(PostgresQueryBuilder);

    executor
        .query_all(&sql, &values)?
        .iter()
        .map(MigrationRecord::from_record)
        .collect()
}

/// Record `file` as applied
pub fn record_applied(executor: &dyn Executor, file: &MigrationFile) -> Result<(), MigrationError> {
    let mut stmt = InsertStatement::default();
    stmt.into_table(Alias::new(STATE_TABLE))
        .columns(["version", "name", "checksum"].map(Alias::new))
        .values([
            Expr::val(file.version),
            Expr::val(file.name.clone()),
            Expr::val(file.checksum.clone()),
        ])
        .map_err(|e| MigrationError::InvalidFormat(e.to_string()))?;

    let (sql, values) = stmt.build(PostgresQueryBuilder);
    executor.execute(&sql, &values)?;
    Ok(())
}

/// Forget an applied migration after rolling it back
pub fn remove_applied(executor: &dyn Executor, version: i64) -> Result<(), MigrationError> {
    let (sql, values) = DeleteStatement::default()
        .from_table(Alias::new(STATE_TABLE))
        .and_where(Expr::col(Alias::new("version")).eq(version))
        .build(PostgresQueryBuilder);
    executor.execute(&sql, &values)?;
    Ok(())
}
