//! Metrics module for metrics-collector.
//! Provides Prometheus metrics for collection runs and the reporting store.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, HistogramVec,
    IntCounterVec, TextEncoder,
};
use service_core::error::AppError;
use std::path::Path;
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "collector_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Buckets by object type and outcome (created, reused, failed, not_attempted)
pub static BUCKETS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Collaborator fetch duration histogram
pub static FETCH_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);

    BUCKETS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "collector_buckets_total",
                "Aggregated usage buckets by object type and outcome"
            ),
            &["object_type", "outcome"]
        )
        .expect("Failed to register BUCKETS_TOTAL")
    });

    FETCH_DURATION.get_or_init(|| {
        register_histogram_vec!(
            histogram_opts!(
                "collector_fetch_duration_seconds",
                "Duration of cluster and cloud API fetches"
            ),
            &["source"]
        )
        .expect("Failed to register FETCH_DURATION")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("collector_errors_total", "Total errors by type and operation"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });
}

/// Record the outcome of one bucket.
pub fn record_bucket(object_type: &str, outcome: &str) {
    if let Some(counter) = BUCKETS_TOTAL.get() {
        counter.with_label_values(&[object_type, outcome]).inc();
    }
}

/// Record a collaborator fetch duration.
pub fn record_fetch_duration(source: &str, duration_secs: f64) {
    if let Some(histogram) = FETCH_DURATION.get() {
        histogram.with_label_values(&[source]).observe(duration_secs);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// Write the metrics text to `path` for a node exporter textfile collector.
pub async fn write_metrics(path: &Path) -> Result<(), AppError> {
    // Write then rename so the exporter never reads a partial file.
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, get_metrics()).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
