//! [`Executor`] over a `may_postgres` client.

use super::executor::Executor;
use super::value_conversion::with_converted_params;
use crate::error::{registry, EngineError, ErrorKind};
use crate::record::{Record, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use may_postgres::types::{FromSql, Type};
use may_postgres::{Client, Error as PostgresError, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_query::Values;
use std::sync::Once;
use std::time::Instant;
use uuid::Uuid;

#[cfg(feature = "tracing")]
use crate::tracing_helpers;

/// SQLSTATE for check_violation
pub const CHECK_VIOLATION: &str = "23514";
/// SQLSTATE for foreign_key_violation
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
/// SQLSTATE for not_null_violation
pub const NOT_NULL_VIOLATION: &str = "23502";
/// SQLSTATE for unique_violation
pub const UNIQUE_VIOLATION: &str = "23505";

static REGISTER: Once = Once::new();

/// Register PostgreSQL integrity-constraint SQLSTATEs with the error registry.
///
/// Runs once per process; constructing a [`SqlScope`](super::SqlScope) calls it.
pub fn register_error_kinds() {
    REGISTER.call_once(|| {
        registry::register(CHECK_VIOLATION, ErrorKind::CheckConstraintViolation);
        registry::register(FOREIGN_KEY_VIOLATION, ErrorKind::ForeignKeyConstraintViolation);
        registry::register(NOT_NULL_VIOLATION, ErrorKind::NotNullConstraintViolation);
        registry::register(UNIQUE_VIOLATION, ErrorKind::UniqueConstraintViolation);
    });
}

/// Engine error carrying the SQLSTATE and the server's message
fn engine_error(err: &PostgresError) -> EngineError {
    let code = err.code().map(|state| state.code()).unwrap_or_default();
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    EngineError::new(code, message)
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, EngineError> {
    row.try_get::<usize, Option<T>>(idx).map_err(|e| {
        EngineError::other(format!("Failed to decode column '{}': {e}", row.columns()[idx].name()))
    })
}

fn decode_column(row: &Row, idx: usize) -> Result<Value, EngineError> {
    let ty = row.columns()[idx].type_();

    let value = if *ty == Type::BOOL {
        get::<bool>(row, idx)?.map(Value::from)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx)?.map(Value::from)
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx)?.map(Value::from)
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx)?.map(Value::from)
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx)?.map(Value::from)
    } else if *ty == Type::NUMERIC {
        get::<Decimal>(row, idx)?.map(|d| {
            if d.fract().is_zero() {
                d.to_i64().map_or_else(|| Value::from(d.to_f64()), Value::from)
            } else {
                Value::from(d.to_f64())
            }
        })
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<Value>(row, idx)?
    } else if *ty == Type::TIMESTAMPTZ {
        get::<DateTime<Utc>>(row, idx)?.map(|ts| Value::from(ts.to_rfc3339()))
    } else if *ty == Type::TIMESTAMP {
        get::<NaiveDateTime>(row, idx)?
            .map(|ts| Value::from(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
    } else if *ty == Type::DATE {
        get::<NaiveDate>(row, idx)?.map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
    } else if *ty == Type::UUID {
        get::<Uuid>(row, idx)?.map(|u| Value::from(u.to_string()))
    } else if *ty == Type::BYTEA {
        get::<Vec<u8>>(row, idx)?.map(Value::from)
    } else {
        // text, varchar, bpchar, name and anything else with a text form
        get::<String>(row, idx)?.map(Value::from)
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Decode a row into a record keyed by column name
pub fn decode_row(row: &Row) -> Result<Record, EngineError> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| Ok((column.name().to_string(), decode_column(row, idx)?)))
        .collect()
}

/// Executor backed by a single `may_postgres` client
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        register_error_kinds();
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }
}

impl Executor for MayPostgresExecutor {
    fn execute(&self, sql: &str, values: &Values) -> Result<u64, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        let start = Instant::now();
        let result = with_converted_params(values, |params| {
            self.client.execute(sql, params).map_err(|e| engine_error(&e))
        });
        log::debug!("executed in {:?}: {sql}", start.elapsed());

        result
    }

    fn query_all(&self, sql: &str, values: &Values) -> Result<Vec<Record>, EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        let start = Instant::now();
        let rows = with_converted_params(values, |params| {
            self.client.query(sql, params).map_err(|e| engine_error(&e))
        })?;
        log::debug!("{} row(s) in {:?}: {sql}", rows.len(), start.elapsed());

        rows.iter().map(decode_row).collect()
    }

    fn batch_execute(&self, sql: &str) -> Result<(), EngineError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        self.client.batch_execute(sql).map_err(|e| engine_error(&e))
    }
}
