//! Operation wire format.
//!
//! The source endpoint returns a document of the form
//! `{"data": [{"table": .., "operation": .., "data": {..}, "condition": {..}}, ..]}`.
//! Elements are validated one at a time so that a single bad entry never
//! prevents the rest of the batch from being applied.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Key under which the operation array is delivered.
pub const DOCUMENT_DATA_KEY: &str = "data";

/// The three supported mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(CoreError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub table: String,
    pub kind: OperationKind,
    pub data: Map<String, Value>,
    pub condition: Map<String, Value>,
}

/// Loosely-typed wire shape; every field is optional so that validation can
/// report exactly what is wrong.
#[derive(Debug, Default, Deserialize)]
struct RawOperation {
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    condition: Option<Map<String, Value>>,
}

impl Operation {
    /// Validate one element of the operation array.
    ///
    /// - Non-objects and mistyped fields are [`CoreError::Malformed`].
    /// - A missing or empty `table` / `operation` is [`CoreError::MissingField`].
    /// - An operation other than create/update/delete is
    ///   [`CoreError::UnsupportedOperation`].
    /// - `data` and `condition` default to empty mappings.
    pub fn parse(raw: &Value) -> Result<Self, CoreError> {
        if !raw.is_object() {
            return Err(CoreError::Malformed(format!(
                "expected an object, got {}",
                json_kind(raw)
            )));
        }

        let parsed: RawOperation = serde_json::from_value(raw.clone())
            .map_err(|e| CoreError::Malformed(e.to_string()))?;

        let table = parsed.table.filter(|t| !t.is_empty());
        let operation = parsed.operation.filter(|o| !o.is_empty());
        let (Some(table), Some(operation)) = (table, operation) else {
            return Err(CoreError::MissingField);
        };

        Ok(Self {
            table,
            kind: operation.parse()?,
            data: parsed.data.unwrap_or_default(),
            condition: parsed.condition.unwrap_or_default(),
        })
    }
}

/// Best-effort `(table, operation)` labels of a raw element, for reporting
/// elements that failed validation.
pub fn describe(raw: &Value) -> (Option<String>, Option<String>) {
    let field = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
    (field("table"), field("operation"))
}

/// Extract the operation array from a fetched document.
pub fn extract_operations(document: Value) -> Result<Vec<Value>, CoreError> {
    match document {
        Value::Object(mut map) => match map.remove(DOCUMENT_DATA_KEY) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(CoreError::InvalidDocument(format!(
                "'{DOCUMENT_DATA_KEY}' must be an array, got {}",
                json_kind(&other)
            ))),
            None => Err(CoreError::InvalidDocument(format!(
                "JSON response does not contain '{DOCUMENT_DATA_KEY}' key"
            ))),
        },
        other => Err(CoreError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
