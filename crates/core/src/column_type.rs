//! Column type model.
//!
//! Maps Postgres `udt_name` values (as reported by `information_schema`) to
//! a small closed set of types the worker knows how to coerce values into,
//! and infers a storage type from a single sample JSON value when a table
//! has to be created on the fly.

use std::fmt;

use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;

use crate::identifier::quote_identifier;

/// Storage type of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric,
    Boolean,
    Text,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Uuid,
    Json,
    Jsonb,
    /// Any other type (enums, arrays, domains), kept by its `udt_name`.
    Other(String),
}

impl ColumnType {
    /// Map a Postgres `udt_name` to a column type.
    pub fn from_udt_name(udt_name: &str) -> Self {
        match udt_name {
            "int2" => Self::SmallInt,
            "int4" => Self::Integer,
            "int8" => Self::BigInt,
            "float4" => Self::Real,
            "float8" => Self::Double,
            "numeric" => Self::Numeric,
            "bool" => Self::Boolean,
            "text" | "varchar" | "bpchar" | "name" | "citext" => Self::Text,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            "date" => Self::Date,
            "time" | "timetz" => Self::Time,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            other => Self::Other(other.to_string()),
        }
    }

    /// Type name as written in DDL and in `$n::<type>` casts.
    pub fn sql_name(&self) -> String {
        match self {
            Self::SmallInt => "smallint".into(),
            Self::Integer => "integer".into(),
            Self::BigInt => "bigint".into(),
            Self::Real => "real".into(),
            Self::Double => "double precision".into(),
            Self::Numeric => "numeric".into(),
            Self::Boolean => "boolean".into(),
            Self::Text => "text".into(),
            Self::Timestamp => "timestamp".into(),
            Self::TimestampTz => "timestamptz".into(),
            Self::Date => "date".into(),
            Self::Time => "time".into(),
            Self::Uuid => "uuid".into(),
            Self::Json => "json".into(),
            Self::Jsonb => "jsonb".into(),
            Self::Other(name) => quote_identifier(name),
        }
    }

    /// Infer a storage type from one sample value.
    ///
    /// Integers become `BIGINT`, other numbers `DOUBLE PRECISION`, booleans
    /// `BOOLEAN`, RFC 3339 strings `TIMESTAMPTZ`. Everything else, including
    /// `null`, arrays and objects, falls back to `TEXT`.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() => Self::BigInt,
            Value::Number(n) if n.is_u64() => Self::Numeric,
            Value::Number(_) => Self::Double,
            Value::String(s) if DateTime::parse_from_rfc3339(s).is_ok() => Self::TimestampTz,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_name())
    }
}
