//! Value conversion between records, SeaQuery and `may_postgres`.
//!
//! Record values are JSON, so their SQL type is only known once PostgreSQL
//! has prepared the statement. Parameters are therefore converted in two
//! passes:
//! 1. First pass: collect every SeaQuery value into an owned [`Param`]
//! 2. Second pass: borrow each stored param as `&dyn ToSql`
//!
//! A [`Param`] encodes itself according to the parameter type the server
//! reports, so an integer can bind to `int4`, `int8` or `numeric` and an
//! RFC 3339 string to `timestamptz`.

use crate::error::EngineError;
use crate::record::Value as JsonValue;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use rust_decimal::Decimal;
use sea_query::{Value, Values};
use std::error::Error;
use std::str::FromStr;
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// SeaQuery value for a record value.
///
/// Arrays and objects bind as JSON.
pub fn to_sea_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::String(None),
        JsonValue::Bool(b) => Value::Bool(Some(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::BigInt(Some(i)),
            None => Value::Double(n.as_f64()),
        },
        JsonValue::String(s) => Value::String(Some(s.clone().into())),
        other => Value::Json(Some(other.clone().into())),
    }
}

/// Owned query parameter that adapts to the server-side column type
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

fn is_text(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(ts) => Ok(ts.naive_utc()),
        Err(_) => Ok(NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))?),
    }
}

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Param::Null => Ok(IsNull::Yes),
            Param::Bool(b) => b.to_sql(ty, out),
            Param::Int(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*i as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*i as f64).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from(*i).to_sql(ty, out)
                } else if is_text(ty) {
                    i.to_string().to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Param::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::try_from(*f)?.to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Param::Text(s) => {
                if *ty == Type::TIMESTAMPTZ {
                    DateTime::parse_from_rfc3339(s)?
                        .with_timezone(&Utc)
                        .to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    parse_timestamp(s)?.to_sql(ty, out)
                } else if *ty == Type::DATE {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out)
                } else if *ty == Type::UUID {
                    Uuid::parse_str(s)?.to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from_str(s)?.to_sql(ty, out)
                } else if *ty == Type::JSON || *ty == Type::JSONB {
                    JsonValue::String(s.clone()).to_sql(ty, out)
                } else {
                    s.to_sql(ty, out)
                }
            }
            Param::Bytes(b) => b.to_sql(ty, out),
            Param::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// First pass: own every value as a [`Param`]
pub(crate) fn collect_params(values: &Values) -> Result<Vec<Param>, EngineError> {
    values
        .iter()
        .map(|value| {
            let param = match value {
                Value::Bool(Some(b)) => Param::Bool(*b),
                Value::TinyInt(Some(i)) => Param::Int(i64::from(*i)),
                Value::SmallInt(Some(i)) => Param::Int(i64::from(*i)),
                Value::Int(Some(i)) => Param::Int(i64::from(*i)),
                Value::BigInt(Some(i)) => Param::Int(*i),
                Value::TinyUnsigned(Some(u)) => Param::Int(i64::from(*u)),
                Value::SmallUnsigned(Some(u)) => Param::Int(i64::from(*u)),
                Value::Unsigned(Some(u)) => Param::Int(i64::from(*u)),
                Value::BigUnsigned(Some(u)) => Param::Int(i64::try_from(*u).map_err(|_| {
                    EngineError::other(format!(
                        "BigUnsigned value {u} exceeds i64::MAX ({}), cannot be safely cast to i64",
                        i64::MAX
                    ))
                })?),
                Value::Float(Some(f)) => Param::Float(f64::from(*f)),
                Value::Double(Some(d)) => Param::Float(*d),
                Value::String(Some(s)) => Param::Text(s.to_string()),
                Value::Bytes(Some(b)) => Param::Bytes(b.to_vec()),
                Value::Json(Some(j)) => Param::Json(JsonValue::clone(j)),
                Value::Bool(None)
                | Value::TinyInt(None)
                | Value::SmallInt(None)
                | Value::Int(None)
                | Value::BigInt(None)
                | Value::TinyUnsigned(None)
                | Value::SmallUnsigned(None)
                | Value::Unsigned(None)
                | Value::BigUnsigned(None)
                | Value::Float(None)
                | Value::Double(None)
                | Value::String(None)
                | Value::Bytes(None)
                | Value::Json(None) => Param::Null,
                _ => {
                    return Err(EngineError::other(format!(
                        "Unsupported value type in query: {value:?}"
                    )))
                }
            };
            Ok(param)
        })
        .collect()
}

/// Convert SeaQuery values to `may_postgres` parameters and run `f` with them.
///
/// The borrowed parameters are only valid inside `f`.
///
/// # Errors
///
/// Returns an [`EngineError`] for value types records never produce
/// (chrono or decimal variants, for instance), or whatever `f` returns.
pub fn with_converted_params<F, R>(values: &Values, f: F) -> Result<R, EngineError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, EngineError>,
{
    let stored = collect_params(values)?;
    let params: Vec<&dyn ToSql> = stored.iter().map(|param| param as &dyn ToSql).collect();
    f(&params)
}
