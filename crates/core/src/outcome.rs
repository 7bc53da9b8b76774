//! Per-operation outcomes and the batch report built from them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Outcome categories
// ---------------------------------------------------------------------------

/// `tracing` target for created-record events.
pub const TARGET_CREATED: &str = "opsync::created";
/// `tracing` target for updated-record events.
pub const TARGET_UPDATED: &str = "opsync::updated";
/// `tracing` target for deleted-record events.
pub const TARGET_DELETED: &str = "opsync::deleted";
/// `tracing` target for skipped operations.
pub const TARGET_SKIPPED: &str = "opsync::skipped";
/// `tracing` target for failed operations and batch-level failures.
pub const TARGET_FAILURES: &str = "opsync::failures";

/// The five buckets every operation ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeCategory {
    Created,
    Updated,
    Deleted,
    Skipped,
    Failed,
}

impl OutcomeCategory {
    pub const ALL: [OutcomeCategory; 5] = [
        Self::Created,
        Self::Updated,
        Self::Deleted,
        Self::Skipped,
        Self::Failed,
    ];

    /// The `tracing` target events of this category are emitted under.
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::Created => TARGET_CREATED,
            Self::Updated => TARGET_UPDATED,
            Self::Deleted => TARGET_DELETED,
            Self::Skipped => TARGET_SKIPPED,
            Self::Failed => TARGET_FAILURES,
        }
    }

    /// File name of this category's log within the log directory.
    pub fn log_file_name(&self) -> &'static str {
        match self {
            Self::Created => "created_records.log",
            Self::Updated => "updated_records.log",
            Self::Deleted => "deleted_records.log",
            Self::Skipped => "skipped_operations.log",
            Self::Failed => "failures.log",
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an operation was skipped without error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Insert hit a unique constraint.
    Duplicate,
    /// No row matched the update/delete condition.
    NotFound,
    /// The table does not exist and auto-creation is disabled.
    TableMissing,
    /// The filtered update payload was empty.
    NothingToUpdate,
    /// The operation type is not create/update/delete.
    UnsupportedOperation { operation: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => f.write_str("duplicate record"),
            Self::NotFound => f.write_str("record not found"),
            Self::TableMissing => f.write_str("table does not exist"),
            Self::NothingToUpdate => f.write_str("nothing to update"),
            Self::UnsupportedOperation { operation } => {
                write!(f, "unsupported operation '{operation}'")
            }
        }
    }
}

/// What happened to a single operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Created {
        data: Map<String, Value>,
    },
    Updated {
        data: Map<String, Value>,
        condition: Map<String, Value>,
    },
    Deleted {
        condition: Map<String, Value>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

impl Outcome {
    pub fn category(&self) -> OutcomeCategory {
        match self {
            Self::Created { .. } => OutcomeCategory::Created,
            Self::Updated { .. } => OutcomeCategory::Updated,
            Self::Deleted { .. } => OutcomeCategory::Deleted,
            Self::Skipped { .. } => OutcomeCategory::Skipped,
            Self::Failed { .. } => OutcomeCategory::Failed,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }
}

/// An [`Outcome`] tagged with the operation it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationOutcome {
    /// Position of the operation in the fetched batch.
    pub index: usize,
    pub table: Option<String>,
    pub operation: Option<String>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Batch report
// ---------------------------------------------------------------------------

/// Per-category counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTotals {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchTotals {
    pub fn record(&mut self, category: OutcomeCategory) {
        match category {
            OutcomeCategory::Created => self.created += 1,
            OutcomeCategory::Updated => self.updated += 1,
            OutcomeCategory::Deleted => self.deleted += 1,
            OutcomeCategory::Skipped => self.skipped += 1,
            OutcomeCategory::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.deleted + self.skipped + self.failed
    }
}

/// Structured result of applying one fetched batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub totals: BatchTotals,
    /// Outcomes in batch order, regardless of completion order.
    pub outcomes: Vec<OperationOutcome>,
}

impl BatchReport {
    pub fn new(
        batch_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        mut outcomes: Vec<OperationOutcome>,
    ) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let mut totals = BatchTotals::default();
        for o in &outcomes {
            totals.record(o.outcome.category());
        }
        Self {
            batch_id,
            started_at,
            finished_at,
            totals,
            outcomes,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn outcome(index: usize, outcome: Outcome) -> OperationOutcome {
        OperationOutcome {
            index,
            table: Some("users".into()),
            operation: Some("create".into()),
            outcome,
        }
    }

    #[test]
    fn every_category_has_distinct_target_and_file() {
        let targets: std::collections::HashSet<_> =
            OutcomeCategory::ALL.iter().map(|c| c.log_target()).collect();
        let files: std::collections::HashSet<_> =
            OutcomeCategory::ALL.iter().map(|c| c.log_file_name()).collect();
        assert_eq!(targets.len(), 5);
        assert_eq!(files.len(), 5);
    }

    #[test]
    fn report_sorts_by_index_and_counts() {
        let now = Utc::now();
        let report = BatchReport::new(
            Uuid::nil(),
            now,
            now,
            vec![
                outcome(2, Outcome::failed("boom")),
                outcome(0, Outcome::Created { data: Map::new() }),
                outcome(1, Outcome::skipped(SkipReason::Duplicate)),
                outcome(3, Outcome::skipped(SkipReason::NotFound)),
            ],
        );

        let indices: Vec<_> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert_eq!(report.totals.created, 1);
        assert_eq!(report.totals.skipped, 2);
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.totals.total(), 4);
    }

    #[test]
    fn outcome_serializes_flat_with_status_tag() {
        let o = outcome(
            0,
            Outcome::skipped(SkipReason::UnsupportedOperation {
                operation: "merge".into(),
            }),
        );
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(
            v,
            json!({
                "index": 0,
                "table": "users",
                "operation": "create",
                "status": "skipped",
                "reason": {"kind": "unsupported_operation", "operation": "merge"}
            })
        );
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(SkipReason::NotFound.to_string(), "record not found");
        assert_eq!(
            SkipReason::UnsupportedOperation {
                operation: "merge".into()
            }
            .to_string(),
            "unsupported operation 'merge'"
        );
    }
}
