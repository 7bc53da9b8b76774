//! Postgres access for the operation sync worker.
//!
//! - [`schema`]: runtime reflection of tables and columns from
//!   `information_schema`.
//! - [`registry`]: the shared, lock-guarded schema cache with lazy table
//!   creation.
//! - [`ddl`]: `CREATE TABLE` generation from a sample payload.
//! - [`records`]: insert / update-first / delete-first against a reflected
//!   table.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub mod ddl;
pub mod error;
pub mod records;
pub mod registry;
pub mod schema;

pub use error::DbError;
pub use registry::SchemaRegistry;
pub use schema::{ColumnSchema, DatabaseSchema, TableSchema};

pub type DbPool = sqlx::PgPool;

/// How long to wait for a free connection before failing an operation.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}
