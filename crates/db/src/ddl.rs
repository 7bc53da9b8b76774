//! Table creation from a sample payload.

use opsync_core::column_type::ColumnType;
use opsync_core::error::CoreError;
use opsync_core::identifier::{qualified_table, quote_identifier, validate_identifier};
use serde_json::{Map, Value};

/// Surrogate key every auto-created table gets.
pub const ID_COLUMN: &str = "id";

/// Column definitions inferred from `sample`, excluding [`ID_COLUMN`].
pub fn inferred_columns(sample: &Map<String, Value>) -> Vec<(String, ColumnType)> {
    sample
        .iter()
        .filter(|(name, _)| name.as_str() != ID_COLUMN)
        .map(|(name, value)| (name.clone(), ColumnType::infer(value)))
        .collect()
}

/// Build `CREATE TABLE IF NOT EXISTS` for `table`, typed from `sample`.
pub fn create_table_sql(
    schema: &str,
    table: &str,
    sample: &Map<String, Value>,
) -> Result<String, CoreError> {
    validate_identifier(schema)?;
    validate_identifier(table)?;

    let mut definitions = vec![format!("{} BIGSERIAL PRIMARY KEY", quote_identifier(ID_COLUMN))];
    for (name, ty) in inferred_columns(sample) {
        validate_identifier(&name)?;
        definitions.push(format!("{} {}", quote_identifier(&name), ty.sql_name()));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_table(schema, table),
        definitions.join(", ")
    ))
}
