//! Metrics collector entry point.

use metrics_collector::config::CollectorConfig;
use metrics_collector::services::metrics::{init_metrics, write_metrics};
use metrics_collector::startup::Application;

use service_core::observability::{init_tracing, shutdown_tracing};
use tokio::signal;
use tokio_util::sync::CancellationToken;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing the current bucket");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let config = CollectorConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.common.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        job = config.job.as_str(),
        billing_date = %config.billing_date(),
        dry_run = config.dry_run,
        zones = ?config.exoscale.zones,
        "Starting metrics-collector"
    );

    init_metrics();
    let metrics_path = config.metrics_path.clone();

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        shutdown_tracing();
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    let cancel = CancellationToken::new();
    let signal_guard = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let result = app.run(&cancel).await;
    signal_guard.abort();
    app.shutdown().await;

    if let Some(path) = metrics_path {
        if let Err(e) = write_metrics(&path).await {
            tracing::warn!(error = %e, path = %path.display(), "Failed to write metrics file");
        }
    }

    let outcome = match result {
        Ok(report) => {
            if !report.is_complete() {
                tracing::warn!(
                    failed = report.failures.len(),
                    not_attempted = report.not_attempted,
                    "Run finished with unsaved buckets"
                );
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Collection run failed");
            Err(std::io::Error::other(format!("Collection error: {}", e)))
        }
    };

    shutdown_tracing();
    outcome
}
