use crate::aggregate::{aggregate, attach_organizations};
use crate::clients::{ClusterSource, UsageSource};
use crate::models::{Aggregated, Key, Measure, ObjectType};
use crate::services::metrics::record_fetch_duration;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, instrument};

/// Sum stored bytes per namespace across its buckets.
#[instrument(skip_all)]
pub async fn collect(
    cluster: &dyn ClusterSource,
    usage: &dyn UsageSource,
) -> Result<BTreeMap<Key, Aggregated>, AppError> {
    let started = Instant::now();
    let namespaces = cluster.organizations_by_namespace().await?;
    let buckets = cluster
        .managed_resources(ObjectType::ObjectStorage)
        .await?;
    record_fetch_duration("cluster", started.elapsed().as_secs_f64());

    let started = Instant::now();
    let records = usage.storage_usage().await?;
    record_fetch_duration("storage_usage", started.elapsed().as_secs_f64());

    let details = attach_organizations(&buckets, &namespaces);
    info!(
        buckets = buckets.len(),
        details = details.len(),
        usage_records = records.len(),
        "Collected object storage inputs"
    );

    Ok(aggregate(&records, &details, Measure::Bytes))
}
