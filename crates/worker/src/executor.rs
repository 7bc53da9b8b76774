//! Bounded concurrent execution of one batch.

use std::sync::Arc;

use chrono::Utc;
use opsync_core::operation::describe;
use opsync_core::outcome::{BatchReport, OperationOutcome, Outcome};
use serde_json::Value;
use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

use crate::dispatcher::{dispatch, log_outcome, OperationApplier};

/// Default number of operations in flight at once.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Runs each operation of a batch as its own task, at most `width` at a
/// time.
pub struct Executor {
    applier: Arc<dyn OperationApplier>,
    width: usize,
}

impl Executor {
    pub fn new(applier: Arc<dyn OperationApplier>, width: usize) -> Self {
        Self {
            applier,
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Apply every element of `operations` and report the outcomes in
    /// batch order.
    ///
    /// Submission waits whenever `width` tasks are in flight. A task that
    /// panics is reported as failed.
    pub async fn run_batch(&self, operations: Vec<Value>) -> BatchReport {
        let batch_id = Uuid::now_v7();
        let started_at = Utc::now();
        let total = operations.len();
        tracing::info!(%batch_id, total, width = self.width, "Processing batch");

        let mut tasks = JoinSet::new();
        let mut outcomes: Vec<Option<OperationOutcome>> = vec![None; total];
        let mut raws: Vec<Value> = Vec::with_capacity(total);

        for (index, raw) in operations.into_iter().enumerate() {
            while tasks.len() >= self.width {
                if let Some(joined) = tasks.join_next().await {
                    collect(&mut outcomes, joined);
                }
            }

            raws.push(raw.clone());
            let applier = Arc::clone(&self.applier);
            tasks.spawn(async move { dispatch(applier.as_ref(), index, &raw).await });
        }

        while let Some(joined) = tasks.join_next().await {
            collect(&mut outcomes, joined);
        }

        let outcomes: Vec<OperationOutcome> = outcomes
            .into_iter()
            .zip(&raws)
            .enumerate()
            .map(|(index, (outcome, raw))| outcome.unwrap_or_else(|| panicked(index, raw)))
            .collect();

        let report = BatchReport::new(batch_id, started_at, Utc::now(), outcomes);
        tracing::info!(
            %batch_id,
            created = report.totals.created,
            updated = report.totals.updated,
            deleted = report.totals.deleted,
            skipped = report.totals.skipped,
            failed = report.totals.failed,
            duration_ms = report.duration_ms(),
            "All operations have been processed",
        );
        report
    }
}

fn collect(outcomes: &mut [Option<OperationOutcome>], joined: Result<OperationOutcome, JoinError>) {
    match joined {
        Ok(outcome) => {
            let index = outcome.index;
            outcomes[index] = Some(outcome);
        }
        Err(e) => tracing::error!(error = %e, "Operation task did not complete"),
    }
}

/// Outcome for an operation whose task died before reporting.
fn panicked(index: usize, raw: &Value) -> OperationOutcome {
    let (table, operation) = describe(raw);
    let outcome = OperationOutcome {
        index,
        table,
        operation,
        outcome: Outcome::failed("An operation generated an exception: task panicked"),
    };
    log_outcome(&outcome, raw);
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use opsync_core::operation::Operation;
    use serde_json::json;

    use super::*;

    struct PanicOn(&'static str);

    #[async_trait]
    impl OperationApplier for PanicOn {
        async fn apply(&self, op: &Operation) -> Outcome {
            if op.table == self.0 {
                panic!("boom");
            }
            Outcome::Created {
                data: op.data.clone(),
            }
        }
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_failed() {
        let executor = Executor::new(Arc::new(PanicOn("bad")), 2);
        let report = executor
            .run_batch(vec![
                json!({"table": "good", "operation": "create"}),
                json!({"table": "bad", "operation": "create"}),
                json!({"table": "good", "operation": "create"}),
            ])
            .await;

        assert_eq!(report.totals.created, 2);
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.outcomes[1].table.as_deref(), Some("bad"));
        assert_matches!(report.outcomes[1].outcome, Outcome::Failed { .. });
    }

    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl OperationApplier for Gauge {
        async fn apply(&self, _op: &Operation) -> Outcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Outcome::Deleted {
                condition: Default::default(),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_width() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let executor = Executor::new(gauge.clone(), 3);
        let ops = (0..20)
            .map(|_| json!({"table": "t", "operation": "delete", "condition": {"id": 1}}))
            .collect();

        let report = executor.run_batch(ops).await;

        assert_eq!(report.totals.deleted, 20);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_batch_produces_empty_report() {
        let report = Executor::new(Arc::new(PanicOn("x")), 4).run_batch(Vec::new()).await;
        assert_eq!(report.totals.total(), 0);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn zero_width_is_clamped() {
        assert_eq!(Executor::new(Arc::new(PanicOn("x")), 0).width(), 1);
    }
}
