//! Coercion of JSON payload values into bindable SQL values.
//!
//! Coercion is driven by the target column's [`ColumnType`]. Values that the
//! database can parse from text (dates, uuids, numerics, user types) are
//! passed through as text and cast on the SQL side; scalars that need a
//! native encoding are converted here and rejected early when they cannot
//! possibly fit.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::column_type::ColumnType;
use crate::error::CoreError;

/// A runtime SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

/// Coerce `value` for storage in `column` of type `ty`.
pub fn coerce(column: &str, ty: &ColumnType, value: &Value) -> Result<SqlValue, CoreError> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let mismatch = || CoreError::TypeMismatch {
        column: column.to_string(),
        expected: ty.sql_name(),
        value: value.to_string(),
    };

    match ty {
        ColumnType::SmallInt => {
            let v = integer(value).ok_or_else(mismatch)?;
            i16::try_from(v).map_err(|_| mismatch())?;
            Ok(SqlValue::Int(v))
        }
        ColumnType::Integer => {
            let v = integer(value).ok_or_else(mismatch)?;
            i32::try_from(v).map_err(|_| mismatch())?;
            Ok(SqlValue::Int(v))
        }
        ColumnType::BigInt => integer(value).map(SqlValue::Int).ok_or_else(mismatch),
        ColumnType::Real | ColumnType::Double => match value {
            Value::Number(n) => n.as_f64().map(SqlValue::Float).ok_or_else(mismatch),
            Value::String(s) => s.trim().parse().map(SqlValue::Float).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(SqlValue::Bool(false)),
                Some(1) => Ok(SqlValue::Bool(true)),
                _ => Err(mismatch()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(SqlValue::Bool(true)),
                "false" | "f" | "no" | "0" => Ok(SqlValue::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        ColumnType::Timestamp | ColumnType::TimestampTz => match value {
            Value::String(s) => Ok(match DateTime::parse_from_rfc3339(s) {
                Ok(dt) => SqlValue::Timestamp(dt.with_timezone(&Utc)),
                // Let Postgres try its own, more lenient, input formats.
                Err(_) => SqlValue::Text(s.clone()),
            }),
            _ => Err(mismatch()),
        },
        ColumnType::Json | ColumnType::Jsonb => Ok(SqlValue::Json(value.clone())),
        ColumnType::Numeric => match value {
            Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            _ => Err(mismatch()),
        },
        ColumnType::Text
        | ColumnType::Date
        | ColumnType::Time
        | ColumnType::Uuid
        | ColumnType::Other(_) => Ok(SqlValue::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
    }
}

/// 2^63. `i64::MAX as f64` rounds up to this, so the upper bound must be
/// exclusive.
const I64_UPPER_EXCLUSIVE: f64 = 9_223_372_036_854_775_808.0;

/// Read an integer from a JSON number or numeric string.
///
/// Floats are accepted only when they carry no fractional part and fit
/// `i64` exactly.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            if n.is_u64() {
                return None;
            }
            n.as_f64()
                .filter(|f| {
                    f.fract() == 0.0 && *f >= -I64_UPPER_EXCLUSIVE && *f < I64_UPPER_EXCLUSIVE
                })
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
