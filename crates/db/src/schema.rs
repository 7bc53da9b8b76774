//! Runtime schema reflection.

use std::collections::HashMap;
use std::sync::Arc;

use opsync_core::column_type::ColumnType;
use serde::Serialize;
use sqlx::PgPool;

/// A reflected column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub has_default: bool,
}

/// A reflected table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnSchema>,
    /// Primary key columns in key order; empty when the table has none.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// All base tables of one Postgres schema, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSchema {
    pub tables: HashMap<String, Arc<TableSchema>>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    udt_name: String,
    nullable: bool,
    has_default: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct PrimaryKeyRow {
    table_name: String,
    column_name: String,
}

const COLUMNS_QUERY: &str = "\
    SELECT c.table_name::text AS table_name, \
           c.column_name::text AS column_name, \
           c.udt_name::text AS udt_name, \
           (c.is_nullable = 'YES') AS nullable, \
           (c.column_default IS NOT NULL) AS has_default \
    FROM information_schema.columns c \
    JOIN information_schema.tables t \
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
    WHERE c.table_schema = $1 AND t.table_type = 'BASE TABLE' \
    ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEYS_QUERY: &str = "\
    SELECT tc.table_name::text AS table_name, \
           kcu.column_name::text AS column_name \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
      ON kcu.constraint_schema = tc.constraint_schema \
     AND kcu.constraint_name = tc.constraint_name \
     AND kcu.table_name = tc.table_name \
    WHERE tc.table_schema = $1 AND tc.constraint_type = 'PRIMARY KEY' \
    ORDER BY tc.table_name, kcu.ordinal_position";

/// Reflect every base table in `schema`.
pub async fn reflect_schema(pool: &PgPool, schema: &str) -> Result<DatabaseSchema, sqlx::Error> {
    let columns = sqlx::query_as::<_, ColumnRow>(COLUMNS_QUERY)
        .bind(schema)
        .fetch_all(pool)
        .await?;

    let primary_keys = sqlx::query_as::<_, PrimaryKeyRow>(PRIMARY_KEYS_QUERY)
        .bind(schema)
        .fetch_all(pool)
        .await?;

    let reflected = assemble(columns, primary_keys);
    tracing::debug!(schema, tables = reflected.len(), "Reflected database schema");
    Ok(reflected)
}

/// Group flat column / key rows into tables. Rows arrive ordered by table
/// and ordinal position.
fn assemble(columns: Vec<ColumnRow>, primary_keys: Vec<PrimaryKeyRow>) -> DatabaseSchema {
    let mut tables: HashMap<String, TableSchema> = HashMap::new();

    for row in columns {
        tables
            .entry(row.table_name.clone())
            .or_insert_with(|| TableSchema {
                name: row.table_name.clone(),
                columns: Vec::new(),
                primary_key: Vec::new(),
            })
            .columns
            .push(ColumnSchema {
                column_type: ColumnType::from_udt_name(&row.udt_name),
                name: row.column_name,
                nullable: row.nullable,
                has_default: row.has_default,
            });
    }

    for key in primary_keys {
        if let Some(table) = tables.get_mut(&key.table_name) {
            table.primary_key.push(key.column_name);
        }
    }

    DatabaseSchema {
        tables: tables
            .into_iter()
            .map(|(name, table)| (name, Arc::new(table)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: &str, name: &str, udt: &str) -> ColumnRow {
        ColumnRow {
            table_name: table.into(),
            column_name: name.into(),
            udt_name: udt.into(),
            nullable: name != "id",
            has_default: name == "id",
        }
    }

    #[test]
    fn assemble_groups_columns_and_keys() {
        let schema = assemble(
            vec![
                col("users", "id", "int8"),
                col("users", "name", "text"),
                col("logs", "message", "varchar"),
            ],
            vec![PrimaryKeyRow {
                table_name: "users".into(),
                column_name: "id".into(),
            }],
        );

        assert_eq!(schema.table_names(), ["logs", "users"]);

        let users = schema.table("users").unwrap();
        assert_eq!(users.column_names().collect::<Vec<_>>(), ["id", "name"]);
        assert_eq!(users.primary_key, ["id"]);
        assert_eq!(users.column("id").unwrap().column_type, ColumnType::BigInt);
        assert!(!users.column("id").unwrap().nullable);

        let logs = schema.table("logs").unwrap();
        assert!(logs.primary_key.is_empty());
        assert_eq!(logs.column("message").unwrap().column_type, ColumnType::Text);
    }

    #[test]
    fn keys_for_unknown_tables_are_ignored() {
        let schema = assemble(
            vec![col("a", "x", "int4")],
            vec![PrimaryKeyRow {
                table_name: "b".into(),
                column_name: "id".into(),
            }],
        );
        assert_eq!(schema.len(), 1);
        assert!(!schema.contains("b"));
    }
}
