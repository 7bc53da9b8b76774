//! Payload filtering against a table's known columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// What to do with payload keys that are not columns of the target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownColumnPolicy {
    /// Abort the whole operation.
    #[default]
    Reject,
    /// Silently drop the unknown keys.
    Drop,
}

impl FromStr for UnknownColumnPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "drop" => Ok(Self::Drop),
            other => Err(CoreError::Validation(format!(
                "Unknown column policy must be 'reject' or 'drop', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for UnknownColumnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

/// Keys of `data` that `is_known` does not recognise, in key order.
pub fn unknown_columns(data: &Map<String, Value>, is_known: impl Fn(&str) -> bool) -> Vec<String> {
    data.keys().filter(|k| !is_known(k.as_str())).cloned().collect()
}

/// Restrict `data` to known columns according to `policy`.
pub fn filter_payload(
    table: &str,
    data: &Map<String, Value>,
    is_known: impl Fn(&str) -> bool,
    policy: UnknownColumnPolicy,
) -> Result<Map<String, Value>, CoreError> {
    let unknown = unknown_columns(data, &is_known);
    if !unknown.is_empty() && policy == UnknownColumnPolicy::Reject {
        return Err(CoreError::UnknownColumns {
            table: table.to_string(),
            columns: unknown,
        });
    }

    Ok(data
        .iter()
        .filter(|(k, _)| is_known(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect())
}
