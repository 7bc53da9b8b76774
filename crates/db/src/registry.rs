//! Shared schema registry with lazy table creation.
//!
//! One [`SchemaRegistry`] is shared by every worker task. Lookups take the
//! read side of a single `RwLock`; creating a table takes the write side, so
//! table creation is serialized across the whole process, and a refresh
//! re-reflects the entire schema before the lock is released.

use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::ddl::create_table_sql;
use crate::error::DbError;
use crate::schema::{reflect_schema, DatabaseSchema, TableSchema};

pub struct SchemaRegistry {
    pool: PgPool,
    schema: String,
    tables: RwLock<DatabaseSchema>,
}

impl SchemaRegistry {
    /// Reflect `schema` and build a registry around it.
    pub async fn load(pool: PgPool, schema: impl Into<String>) -> Result<Self, DbError> {
        let schema = schema.into();
        let tables = reflect_schema(&pool, &schema).await?;
        tracing::info!(schema = %schema, tables = tables.len(), "Schema registry loaded");
        Ok(Self {
            pool,
            schema,
            tables: RwLock::new(tables),
        })
    }

    /// Name of the Postgres schema this registry reflects.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub async fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.read().await.table(table)
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.tables.read().await.table_names()
    }

    /// Re-reflect the whole schema, replacing the cached contents.
    pub async fn refresh(&self) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        *tables = reflect_schema(&self.pool, &self.schema).await?;
        Ok(())
    }

    /// Look up `table`, creating it from `sample` if it does not exist yet.
    ///
    /// Returns the table schema and whether this call created it. The
    /// existence check is repeated under the write lock so concurrent
    /// callers racing on the same new table create it exactly once.
    pub async fn get_or_create(
        &self,
        table: &str,
        sample: &Map<String, Value>,
    ) -> Result<(Arc<TableSchema>, bool), DbError> {
        if let Some(existing) = self.get(table).await {
            return Ok((existing, false));
        }

        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.table(table) {
            return Ok((existing, false));
        }

        let ddl = create_table_sql(&self.schema, table, sample)?;
        tracing::info!(table, "Creating table");
        tracing::debug!(sql = %ddl, "Table DDL");
        sqlx::query(&ddl).execute(&self.pool).await?;

        *tables = reflect_schema(&self.pool, &self.schema).await?;
        let created = tables
            .table(table)
            .ok_or_else(|| DbError::TableUnavailable(table.to_string()))?;
        tracing::info!(
            table,
            columns = created.columns.len(),
            tables = tables.len(),
            "Table created and schema refreshed",
        );
        Ok((created, true))
    }
}
