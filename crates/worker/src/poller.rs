//! Periodic fetch-and-apply loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use opsync_core::outcome::{BatchReport, TARGET_FAILURES};
use tokio_util::sync::CancellationToken;

use crate::executor::Executor;
use crate::source::{OperationSource, SourceError};

pub struct Poller {
    source: OperationSource,
    executor: Executor,
    interval: Duration,
    report_file: Option<PathBuf>,
}

impl Poller {
    pub fn new(
        source: OperationSource,
        executor: Executor,
        interval: Duration,
        report_file: Option<PathBuf>,
    ) -> Self {
        Self {
            source,
            executor,
            interval,
            report_file,
        }
    }

    /// Fetch one batch and apply it.
    ///
    /// A fetch error ends the cycle before anything is applied.
    pub async fn run_cycle(&self) -> Result<BatchReport, SourceError> {
        let operations = match self.source.fetch().await {
            Ok(operations) => operations,
            Err(e) => {
                tracing::error!(
                    target: TARGET_FAILURES,
                    url = %self.source.url(),
                    error = %e,
                    "Failed to fetch operations",
                );
                return Err(e);
            }
        };

        let report = self.executor.run_batch(operations).await;

        if let Some(path) = &self.report_file {
            if let Err(e) = write_report(path, &report).await {
                tracing::error!(path = %path.display(), error = %e, "Failed to write batch report");
            }
        }
        Ok(report)
    }

    /// Run cycles every `interval` until `cancel` is triggered.
    ///
    /// A failed cycle is logged and does not stop the loop.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            url = %self.source.url(),
            interval_secs = self.interval.as_secs(),
            "Poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        tracing::warn!(error = %e, "Poll cycle failed");
                    }
                }
            }
        }
    }
}

/// Write `report` to `path` as pretty JSON, replacing any previous report.
pub async fn write_report(path: &Path, report: &BatchReport) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, body).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use opsync_core::outcome::{OperationOutcome, Outcome, SkipReason};
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let now = Utc::now();
        let report = BatchReport::new(
            Uuid::now_v7(),
            now,
            now,
            vec![OperationOutcome {
                index: 0,
                table: Some("users".into()),
                operation: Some("delete".into()),
                outcome: Outcome::skipped(SkipReason::NotFound),
            }],
        );

        write_report(&path, &report).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["totals"]["skipped"], 1);
        assert_eq!(written["outcomes"][0]["status"], "skipped");
        assert_eq!(written["outcomes"][0]["reason"]["kind"], "not_found");
    }
}
