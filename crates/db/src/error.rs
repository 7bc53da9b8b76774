use opsync_core::error::CoreError;

/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A domain-level error (bad identifier, unknown column, type mismatch).
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to create or retrieve table '{0}'")]
    TableUnavailable(String),
}

impl DbError {
    /// Whether this is a unique constraint violation (duplicate key).
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            }
            _ => false,
        }
    }
}
