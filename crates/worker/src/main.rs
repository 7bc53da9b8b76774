//! `opsync-worker` -- applies polled create/update/delete operations to
//! Postgres.
//!
//! See [`WorkerConfig::from_env`] for the environment variables.

use std::sync::Arc;

use anyhow::Context;
use opsync_db::SchemaRegistry;
use opsync_worker::config::WorkerConfig;
use opsync_worker::dispatcher::PgApplier;
use opsync_worker::executor::Executor;
use opsync_worker::logging;
use opsync_worker::poller::Poller;
use opsync_worker::source::OperationSource;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env()?;
    logging::init(&config.log_dir, config.log_format)
        .with_context(|| format!("Failed to open log files in {}", config.log_dir.display()))?;

    tracing::info!(
        source_url = %config.source_url,
        max_workers = config.max_workers,
        db_schema = %config.db_schema,
        unknown_columns = %config.unknown_columns,
        auto_create_tables = config.auto_create_tables,
        run_once = config.run_once,
        "Starting opsync-worker",
    );

    let pool = opsync_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    opsync_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    let registry = SchemaRegistry::load(pool.clone(), config.db_schema.clone())
        .await
        .context("Failed to reflect database schema")?;
    let applier = PgApplier::new(
        pool.clone(),
        Arc::new(registry),
        config.unknown_columns,
        config.auto_create_tables,
    );

    let poller = Poller::new(
        OperationSource::new(config.source_url.clone(), config.request_timeout)?,
        Executor::new(Arc::new(applier), config.max_workers),
        config.poll_interval,
        config.report_file.clone(),
    );

    if config.run_once {
        let result = poller.run_cycle().await;
        pool.close().await;
        result?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    poller.run(cancel).await;
    pool.close().await;
    tracing::info!("opsync-worker stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
