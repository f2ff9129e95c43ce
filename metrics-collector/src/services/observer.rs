//! Side channel the billing run reports progress through.

use crate::error::BillingError;
use crate::models::{Aggregated, Fact, ObjectType};
use crate::services::billing::RunReport;
use crate::services::metrics::{record_bucket, record_error};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

/// Receives run events. Implementations must not fail; the run does not
/// depend on them.
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _billing_date: DateTime<Utc>, _buckets: usize) {}

    fn bucket_persisted(
        &self,
        _bucket: &Aggregated,
        _object_type: ObjectType,
        _fact: &Fact,
        _created: bool,
    ) {
    }

    fn bucket_failed(&self, _bucket: &Aggregated, _error: &BillingError) {}

    /// Buckets left unsaved because the run was cancelled.
    fn run_cancelled(&self, _skipped: &[&Aggregated]) {}

    fn run_finished(&self, _report: &RunReport) {}
}

fn object_type_label(bucket: &Aggregated) -> &'static str {
    bucket
        .key
        .decode()
        .ok()
        .and_then(|parts| ObjectType::from_service_type(&parts.resource_type))
        .map_or("unknown", |t| t.as_str())
}

/// Emits structured log events and Prometheus counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn run_started(&self, billing_date: DateTime<Utc>, buckets: usize) {
        info!(
            billing_date = %billing_date.date_naive(),
            buckets = buckets,
            "Saving aggregated usage to the billing database"
        );
    }

    fn bucket_persisted(
        &self,
        bucket: &Aggregated,
        object_type: ObjectType,
        fact: &Fact,
        created: bool,
    ) {
        let outcome = if created { "created" } else { "reused" };
        record_bucket(object_type.as_str(), outcome);
        info!(
            key = %bucket.key,
            organization = %bucket.organization,
            value = bucket.value,
            quantity = fact.quantity,
            fact_id = %fact.id,
            outcome = outcome,
            "Saved usage bucket"
        );
    }

    fn bucket_failed(&self, bucket: &Aggregated, err: &BillingError) {
        record_bucket(object_type_label(bucket), "failed");
        record_error(err.error_type(), "ensure_bucket_usage");
        error!(
            key = %bucket.key,
            organization = %bucket.organization,
            value = bucket.value,
            error_type = err.error_type(),
            error = %err,
            "Cannot save aggregated usage bucket to billing database"
        );
    }

    fn run_cancelled(&self, skipped: &[&Aggregated]) {
        for bucket in skipped {
            record_bucket(object_type_label(bucket), "not_attempted");
        }
        warn!(
            not_attempted = skipped.len(),
            "Run cancelled, remaining buckets not attempted"
        );
    }

    fn run_finished(&self, report: &RunReport) {
        info!(
            attempted = report.attempted,
            created = report.created,
            reused = report.reused,
            failed = report.failures.len(),
            not_attempted = report.not_attempted,
            "Billing run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Key;
    use crate::services::metrics::{init_metrics, BUCKETS_TOTAL};

    fn aggregated(namespace: &str, plan: &str) -> Aggregated {
        Aggregated {
            key: Key::new(namespace, plan, "redis").unwrap(),
            organization: "org1".to_string(),
            value: 1.0,
        }
    }

    fn not_attempted(object_type: &str) -> u64 {
        BUCKETS_TOTAL
            .get()
            .map_or(0, |c| c.with_label_values(&[object_type, "not_attempted"]).get())
    }

    #[test]
    fn cancelled_buckets_are_counted_per_object_type() {
        init_metrics();
        let skipped = [aggregated("ns1", "hobbyist-2"), aggregated("ns2", "startup-4")];
        let before = not_attempted("dbaas-redis");

        TracingObserver.run_cancelled(&skipped.iter().collect::<Vec<_>>());

        assert_eq!(not_attempted("dbaas-redis") - before, 2);
    }
}
