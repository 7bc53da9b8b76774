//! SQL identifier validation and quoting.
//!
//! Table and column names arrive from an external endpoint and end up in
//! dynamically built SQL. Every name is validated against a conservative
//! character set and then always emitted double-quoted.

use crate::error::CoreError;

/// Postgres truncates identifiers beyond this many bytes (`NAMEDATALEN - 1`).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Allowed identifier characters: ASCII alphanumeric and underscore, not
/// starting with a digit.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate an identifier, returning it unchanged on success.
pub fn validate_identifier(name: &str) -> Result<&str, CoreError> {
    if is_safe_identifier(name) {
        Ok(name)
    } else {
        Err(CoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote an identifier for inclusion in SQL text.
///
/// Embedded double quotes are doubled, so the result is safe even for names
/// that did not pass [`is_safe_identifier`] (e.g. reflected user types).
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a schema-qualified table name: `"schema"."table"`.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}
