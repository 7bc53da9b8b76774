//! Applying a single operation.
//!
//! [`dispatch`] validates one raw element of the batch, hands it to an
//! [`OperationApplier`], and logs the outcome under the category's
//! `tracing` target. [`PgApplier`] is the Postgres implementation: it
//! resolves (or lazily creates) the target table through the shared
//! [`SchemaRegistry`], filters the payload to known columns, and runs
//! exactly one mutation inside its own transaction.

use std::sync::Arc;

use async_trait::async_trait;
use opsync_core::error::CoreError;
use opsync_core::operation::{describe, Operation, OperationKind};
use opsync_core::outcome::{
    OperationOutcome, Outcome, SkipReason, TARGET_CREATED, TARGET_DELETED, TARGET_FAILURES,
    TARGET_SKIPPED, TARGET_UPDATED,
};
use opsync_core::payload::{filter_payload, UnknownColumnPolicy};
use opsync_db::records::RecordRepo;
use opsync_db::{DbError, SchemaRegistry};
use serde_json::Value;
use sqlx::PgPool;

/// Applies validated operations to a store.
#[async_trait]
pub trait OperationApplier: Send + Sync {
    /// Apply `op`, mapping every error to [`Outcome::Failed`] or a skip.
    async fn apply(&self, op: &Operation) -> Outcome;
}

// ---------------------------------------------------------------------------
// Postgres applier
// ---------------------------------------------------------------------------

pub struct PgApplier {
    pool: PgPool,
    registry: Arc<SchemaRegistry>,
    policy: UnknownColumnPolicy,
    auto_create: bool,
}

impl PgApplier {
    pub fn new(
        pool: PgPool,
        registry: Arc<SchemaRegistry>,
        policy: UnknownColumnPolicy,
        auto_create: bool,
    ) -> Self {
        Self {
            pool,
            registry,
            policy,
            auto_create,
        }
    }

    async fn try_apply(&self, op: &Operation) -> Result<Outcome, DbError> {
        let table = match self.registry.get(&op.table).await {
            Some(table) => table,
            None if self.auto_create => {
                let (table, created) = self.registry.get_or_create(&op.table, &op.data).await?;
                if created {
                    tracing::info!(table = %op.table, "Created table from first-seen payload");
                }
                table
            }
            None => return Ok(Outcome::skipped(SkipReason::TableMissing)),
        };

        let data = filter_payload(&table.name, &op.data, |c| table.has_column(c), self.policy)?;
        let schema = self.registry.schema_name();

        if op.kind == OperationKind::Update && data.is_empty() {
            return Ok(Outcome::skipped(SkipReason::NothingToUpdate));
        }

        let mut tx = self.pool.begin().await?;
        let outcome = match op.kind {
            OperationKind::Create => {
                RecordRepo::insert(&mut *tx, schema, &table, &data).await?;
                Outcome::Created { data }
            }
            OperationKind::Update => {
                let rows =
                    RecordRepo::update_first(&mut *tx, schema, &table, &data, &op.condition)
                        .await?;
                if rows == 0 {
                    Outcome::skipped(SkipReason::NotFound)
                } else {
                    Outcome::Updated {
                        data,
                        condition: op.condition.clone(),
                    }
                }
            }
            OperationKind::Delete => {
                let rows =
                    RecordRepo::delete_first(&mut *tx, schema, &table, &op.condition).await?;
                if rows == 0 {
                    Outcome::skipped(SkipReason::NotFound)
                } else {
                    Outcome::Deleted {
                        condition: op.condition.clone(),
                    }
                }
            }
        };
        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl OperationApplier for PgApplier {
    async fn apply(&self, op: &Operation) -> Outcome {
        match self.try_apply(op).await {
            Ok(outcome) => outcome,
            Err(e) if op.kind == OperationKind::Create && e.is_unique_violation() => {
                Outcome::skipped(SkipReason::Duplicate)
            }
            Err(e) => Outcome::failed(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Validate `raw`, apply it, and log the outcome.
pub async fn dispatch(
    applier: &dyn OperationApplier,
    index: usize,
    raw: &Value,
) -> OperationOutcome {
    let outcome = match Operation::parse(raw) {
        Ok(op) => OperationOutcome {
            index,
            table: Some(op.table.clone()),
            operation: Some(op.kind.as_str().to_string()),
            outcome: applier.apply(&op).await,
        },
        Err(e) => {
            let (table, operation) = describe(raw);
            let outcome = match e {
                CoreError::UnsupportedOperation(operation) => {
                    Outcome::skipped(SkipReason::UnsupportedOperation { operation })
                }
                other => Outcome::failed(other),
            };
            OperationOutcome {
                index,
                table,
                operation,
                outcome,
            }
        }
    };

    log_outcome(&outcome, raw);
    outcome
}

/// Emit `outcome` under its category's target.
pub fn log_outcome(outcome: &OperationOutcome, raw: &Value) {
    let index = outcome.index;
    let table = outcome.table.as_deref().unwrap_or("-");

    match &outcome.outcome {
        Outcome::Created { data } => {
            let data = Value::Object(data.clone());
            tracing::info!(
                target: TARGET_CREATED,
                index,
                table,
                data = %data,
                "Created record",
            );
        }
        Outcome::Updated { data, condition } => {
            let data = Value::Object(data.clone());
            let condition = Value::Object(condition.clone());
            tracing::info!(
                target: TARGET_UPDATED,
                index,
                table,
                data = %data,
                condition = %condition,
                "Updated record",
            );
        }
        Outcome::Deleted { condition } => {
            let condition = Value::Object(condition.clone());
            tracing::info!(
                target: TARGET_DELETED,
                index,
                table,
                condition = %condition,
                "Deleted record",
            );
        }
        Outcome::Skipped { reason } => {
            tracing::warn!(
                target: TARGET_SKIPPED,
                index,
                table,
                reason = %reason,
                operation = %raw,
                "Skipping operation",
            );
        }
        Outcome::Failed { error } => {
            tracing::error!(
                target: TARGET_FAILURES,
                index,
                table,
                error = %error,
                operation = %raw,
                "Operation failed",
            );
        }
    }
}
