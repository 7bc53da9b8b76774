//! Record mutations against a reflected table.
//!
//! Statements are built as plain SQL text plus an ordered parameter list, so
//! the SQL generation is testable without a database. Every placeholder is
//! cast to the target column's type (`$1::integer`), which lets a single
//! parameter encoding per [`SqlValue`] variant serve every column type.
//!
//! "First match" for update and delete takes two statements in the caller's
//! transaction. The first locates and locks the row (`ORDER BY` primary key,
//! `LIMIT 1 FOR UPDATE`) and returns its key as text. The second mutates the
//! row by that key. Under READ COMMITTED each statement gets a fresh
//! snapshot, so a row updated concurrently while the lock was awaited is
//! still found by the second statement.
//!
//! The key is the primary key, or `(tableoid, ctid)` for tables without one.

use opsync_core::error::CoreError;
use opsync_core::identifier::{qualified_table, quote_identifier};
use opsync_core::value::{coerce, SqlValue};
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres, Row};

use crate::error::DbError;
use crate::schema::TableSchema;

/// SQL text with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BoundStatement {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push `param` and return `$n::<cast>`.
    fn push(&mut self, param: SqlValue, cast: &str) -> String {
        self.params.push(param);
        format!("${}::{cast}", self.params.len())
    }

    /// Push `value` coerced for `column` and return its cast placeholder.
    fn placeholder(
        &mut self,
        table: &TableSchema,
        column: &str,
        value: &Value,
    ) -> Result<String, CoreError> {
        let col = table.column(column).ok_or_else(|| CoreError::UnknownColumns {
            table: table.name.clone(),
            columns: vec![column.to_string()],
        })?;
        let param = coerce(column, &col.column_type, value)?;
        Ok(self.push(param, &col.column_type.sql_name()))
    }

    /// `"a" = $1::text AND "b" IS NULL ...`
    fn where_clause(
        &mut self,
        table: &TableSchema,
        condition: &Map<String, Value>,
    ) -> Result<String, CoreError> {
        if condition.is_empty() {
            return Err(CoreError::Validation(format!(
                "A non-empty condition is required to match a record in '{}'",
                table.name
            )));
        }
        if let Some(column) = condition.keys().find(|c| !table.has_column(c.as_str())) {
            return Err(CoreError::UnknownConditionColumn {
                table: table.name.clone(),
                column: column.clone(),
            });
        }

        let mut predicates = Vec::with_capacity(condition.len());
        for (column, value) in condition {
            if value.is_null() {
                predicates.push(format!("{} IS NULL", quote_identifier(column)));
            } else {
                let placeholder = self.placeholder(table, column, value)?;
                predicates.push(format!("{} = {placeholder}", quote_identifier(column)));
            }
        }
        Ok(predicates.join(" AND "))
    }

    /// `"id" = $3::bigint AND ...` for a key returned by
    /// [`locate_first_statement`].
    fn key_clause(&mut self, table: &TableSchema, key: &[String]) -> Result<String, CoreError> {
        let columns = row_key(table);
        if columns.len() != key.len() {
            return Err(CoreError::Validation(format!(
                "Row key for '{}' has {} values, expected {}",
                table.name,
                key.len(),
                columns.len()
            )));
        }
        let predicates: Vec<String> = columns
            .iter()
            .zip(key)
            .map(|((expr, cast), value)| {
                let placeholder = self.push(SqlValue::Text(value.clone()), cast);
                format!("{expr} = {placeholder}")
            })
            .collect();
        Ok(predicates.join(" AND "))
    }
}

/// Columns identifying one row, as `(sql expression, cast type)`.
fn row_key(table: &TableSchema) -> Vec<(String, String)> {
    if table.primary_key.is_empty() {
        return vec![("tableoid".into(), "oid".into()), ("ctid".into(), "tid".into())];
    }
    table
        .primary_key
        .iter()
        .map(|k| {
            let cast = table
                .column(k)
                .map(|c| c.column_type.sql_name())
                .unwrap_or_else(|| "text".into());
            (quote_identifier(k), cast)
        })
        .collect()
}

/// `INSERT INTO .. VALUES (..)`, or `DEFAULT VALUES` for an empty payload.
pub fn insert_statement(
    schema: &str,
    table: &TableSchema,
    data: &Map<String, Value>,
) -> Result<BoundStatement, CoreError> {
    let mut stmt = BoundStatement::new();
    let target = qualified_table(schema, &table.name);

    if data.is_empty() {
        stmt.sql = format!("INSERT INTO {target} DEFAULT VALUES");
        return Ok(stmt);
    }

    let mut columns = Vec::with_capacity(data.len());
    let mut values = Vec::with_capacity(data.len());
    for (column, value) in data {
        values.push(stmt.placeholder(table, column, value)?);
        columns.push(quote_identifier(column));
    }

    stmt.sql = format!(
        "INSERT INTO {target} ({}) VALUES ({})",
        columns.join(", "),
        values.join(", ")
    );
    Ok(stmt)
}

/// Select and lock the key of the first row matching `condition`. Every key
/// column is returned as text.
pub fn locate_first_statement(
    schema: &str,
    table: &TableSchema,
    condition: &Map<String, Value>,
) -> Result<BoundStatement, CoreError> {
    let mut stmt = BoundStatement::new();
    let predicate = stmt.where_clause(table, condition)?;

    let key: Vec<String> = row_key(table)
        .into_iter()
        .map(|(expr, _)| format!("{expr}::text"))
        .collect();
    let order_by = if table.primary_key.is_empty() {
        String::new()
    } else {
        let keys: Vec<String> = table.primary_key.iter().map(|k| quote_identifier(k)).collect();
        format!(" ORDER BY {}", keys.join(", "))
    };

    stmt.sql = format!(
        "SELECT {} FROM {} WHERE {predicate}{order_by} LIMIT 1 FOR UPDATE",
        key.join(", "),
        qualified_table(schema, &table.name)
    );
    Ok(stmt)
}

/// Update the row identified by `key` with `data`.
pub fn update_by_key_statement(
    schema: &str,
    table: &TableSchema,
    data: &Map<String, Value>,
    key: &[String],
) -> Result<BoundStatement, CoreError> {
    if data.is_empty() {
        return Err(CoreError::Validation(format!(
            "Nothing to update in '{}'",
            table.name
        )));
    }

    let mut stmt = BoundStatement::new();
    let mut assignments = Vec::with_capacity(data.len());
    for (column, value) in data {
        let placeholder = stmt.placeholder(table, column, value)?;
        assignments.push(format!("{} = {placeholder}", quote_identifier(column)));
    }
    let predicate = stmt.key_clause(table, key)?;

    stmt.sql = format!(
        "UPDATE {} SET {} WHERE {predicate}",
        qualified_table(schema, &table.name),
        assignments.join(", ")
    );
    Ok(stmt)
}

/// Delete the row identified by `key`.
pub fn delete_by_key_statement(
    schema: &str,
    table: &TableSchema,
    key: &[String],
) -> Result<BoundStatement, CoreError> {
    let mut stmt = BoundStatement::new();
    let predicate = stmt.key_clause(table, key)?;
    stmt.sql = format!(
        "DELETE FROM {} WHERE {predicate}",
        qualified_table(schema, &table.name)
    );
    Ok(stmt)
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(v.clone()),
    }
}

fn prepare(stmt: &BoundStatement) -> Query<'_, Postgres, PgArguments> {
    stmt.params
        .iter()
        .fold(sqlx::query(&stmt.sql), |query, param| bind_value(query, param))
}

fn key_values(row: &PgRow) -> Result<Vec<String>, sqlx::Error> {
    (0..row.len()).map(|i| row.try_get::<String, _>(i)).collect()
}

/// Provides the record mutations. All methods run on the caller's
/// connection so they participate in the caller's transaction.
pub struct RecordRepo;

impl RecordRepo {
    /// Execute a built statement, returning the number of affected rows.
    pub async fn execute(conn: &mut PgConnection, stmt: &BoundStatement) -> Result<u64, sqlx::Error> {
        Ok(prepare(stmt).execute(conn).await?.rows_affected())
    }

    /// Insert one record built from `data`.
    pub async fn insert(
        conn: &mut PgConnection,
        schema: &str,
        table: &TableSchema,
        data: &Map<String, Value>,
    ) -> Result<u64, DbError> {
        let stmt = insert_statement(schema, table, data)?;
        Ok(Self::execute(conn, &stmt).await?)
    }

    /// Lock the first record matching `condition` and return its key, or
    /// `None` when nothing matches.
    pub async fn locate_first(
        conn: &mut PgConnection,
        schema: &str,
        table: &TableSchema,
        condition: &Map<String, Value>,
    ) -> Result<Option<Vec<String>>, DbError> {
        let stmt = locate_first_statement(schema, table, condition)?;
        let row = prepare(&stmt).fetch_optional(conn).await?;
        Ok(row.as_ref().map(key_values).transpose()?)
    }

    /// Update the first record matching `condition`. Returns 0 when no
    /// record matched.
    pub async fn update_first(
        conn: &mut PgConnection,
        schema: &str,
        table: &TableSchema,
        data: &Map<String, Value>,
        condition: &Map<String, Value>,
    ) -> Result<u64, DbError> {
        if data.is_empty() {
            return Err(CoreError::Validation(format!("Nothing to update in '{}'", table.name)).into());
        }
        let Some(key) = Self::locate_first(&mut *conn, schema, table, condition).await? else {
            return Ok(0);
        };
        let stmt = update_by_key_statement(schema, table, data, &key)?;
        Ok(Self::execute(conn, &stmt).await?)
    }

    /// Delete the first record matching `condition`. Returns 0 when no
    /// record matched.
    pub async fn delete_first(
        conn: &mut PgConnection,
        schema: &str,
        table: &TableSchema,
        condition: &Map<String, Value>,
    ) -> Result<u64, DbError> {
        let Some(key) = Self::locate_first(&mut *conn, schema, table, condition).await? else {
            return Ok(0);
        };
        let stmt = delete_by_key_statement(schema, table, &key)?;
        Ok(Self::execute(conn, &stmt).await?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use opsync_core::column_type::ColumnType;
    use serde_json::json;

    use super::*;
    use crate::schema::ColumnSchema;

    fn users() -> TableSchema {
        let col = |name: &str, column_type: ColumnType| ColumnSchema {
            name: name.into(),
            column_type,
            nullable: name != "id",
            has_default: name == "id",
        };
        TableSchema {
            name: "users".into(),
            columns: vec![
                col("id", ColumnType::BigInt),
                col("name", ColumnType::Text),
                col("age", ColumnType::Integer),
                col("active", ColumnType::Boolean),
            ],
            primary_key: vec!["id".into()],
        }
    }

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_casts_each_placeholder() {
        let stmt = insert_statement("public", &users(), &map(json!({"age": 30, "name": "ann"})))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"public\".\"users\" (\"age\", \"name\") VALUES ($1::integer, $2::text)"
        );
        assert_eq!(stmt.params, [SqlValue::Int(30), SqlValue::Text("ann".into())]);
    }

    #[test]
    fn insert_empty_payload_uses_default_values() {
        let stmt = insert_statement("public", &users(), &Map::new()).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO \"public\".\"users\" DEFAULT VALUES");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn insert_rejects_unknown_column() {
        assert_matches!(
            insert_statement("public", &users(), &map(json!({"email": "x"}))),
            Err(CoreError::UnknownColumns { columns, .. }) if columns == ["email"]
        );
    }

    #[test]
    fn insert_propagates_type_errors() {
        assert_matches!(
            insert_statement("public", &users(), &map(json!({"age": "old"}))),
            Err(CoreError::TypeMismatch { column, .. }) if column == "age"
        );
    }

    #[test]
    fn locate_orders_by_primary_key_and_locks() {
        let stmt = locate_first_statement("public", &users(), &map(json!({"name": "ann"}))).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"id\"::text FROM \"public\".\"users\" \
             WHERE \"name\" = $1::text ORDER BY \"id\" LIMIT 1 FOR UPDATE"
        );
        assert_eq!(stmt.params, [SqlValue::Text("ann".into())]);
    }

    #[test]
    fn null_condition_matches_is_null() {
        let stmt = locate_first_statement(
            "public",
            &users(),
            &map(json!({"age": null, "name": "ann"})),
        )
        .unwrap();
        assert!(stmt.sql.contains("WHERE \"age\" IS NULL AND \"name\" = $1::text"));
        assert_eq!(stmt.params, [SqlValue::Text("ann".into())]);
    }

    #[test]
    fn table_without_primary_key_is_keyed_by_physical_location() {
        let mut table = users();
        table.primary_key.clear();
        let stmt = locate_first_statement("public", &table, &map(json!({"id": 1}))).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT tableoid::text, ctid::text FROM \"public\".\"users\" \
             WHERE \"id\" = $1::bigint LIMIT 1 FOR UPDATE"
        );

        let key = ["16384".to_string(), "(0,1)".to_string()];
        let stmt = delete_by_key_statement("public", &table, &key).unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM \"public\".\"users\" WHERE tableoid = $1::oid AND ctid = $2::tid"
        );
    }

    #[test]
    fn update_by_key_binds_data_then_key() {
        let stmt = update_by_key_statement(
            "public",
            &users(),
            &map(json!({"active": false})),
            &["7".to_string()],
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"public\".\"users\" SET \"active\" = $1::boolean WHERE \"id\" = $2::bigint"
        );
        assert_eq!(stmt.params, [SqlValue::Bool(false), SqlValue::Text("7".into())]);
    }

    #[test]
    fn delete_by_key_uses_primary_key() {
        let stmt = delete_by_key_statement("public", &users(), &["3".to_string()]).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"public\".\"users\" WHERE \"id\" = $1::bigint");
    }

    #[test]
    fn key_arity_must_match() {
        assert_matches!(
            delete_by_key_statement("public", &users(), &[]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn empty_condition_is_rejected() {
        assert_matches!(
            locate_first_statement("public", &users(), &Map::new()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn unknown_condition_column_is_rejected() {
        let err = locate_first_statement("public", &users(), &map(json!({"email": null})))
            .unwrap_err();
        assert_matches!(
            &err,
            CoreError::UnknownConditionColumn { column, .. } if column == "email"
        );
        assert_eq!(err.to_string(), "Unknown condition column 'email' in 'users'");
    }

    #[test]
    fn empty_update_payload_is_rejected() {
        assert_matches!(
            update_by_key_statement("public", &users(), &Map::new(), &["1".to_string()]),
            Err(CoreError::Validation(_))
        );
    }
}
