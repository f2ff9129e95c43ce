use crate::aggregate::{aggregate, attach_organizations};
use crate::clients::{ClusterSource, UsageSource};
use crate::models::{Aggregated, Key, Measure, ObjectType};
use crate::services::metrics::record_fetch_duration;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, instrument};

/// Count DBaaS instances per namespace, plan and service type.
#[instrument(skip_all)]
pub async fn collect(
    cluster: &dyn ClusterSource,
    usage: &dyn UsageSource,
) -> Result<BTreeMap<Key, Aggregated>, AppError> {
    let started = Instant::now();
    let namespaces = cluster.organizations_by_namespace().await?;
    let mut resources = Vec::new();
    for object_type in ObjectType::DBAAS {
        resources.extend(cluster.managed_resources(object_type).await?);
    }
    record_fetch_duration("cluster", started.elapsed().as_secs_f64());

    let started = Instant::now();
    let records = usage.database_usage().await?;
    record_fetch_duration("dbaas_usage", started.elapsed().as_secs_f64());

    let details = attach_organizations(&resources, &namespaces);
    info!(
        managed_resources = resources.len(),
        details = details.len(),
        usage_records = records.len(),
        "Collected DBaaS inputs"
    );

    Ok(aggregate(&records, &details, Measure::Instances))
}
