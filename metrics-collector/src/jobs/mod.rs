//! Collection jobs. Each fetches ownership and usage, then aggregates it into
//! billing buckets.

pub mod dbaas;
pub mod objectstorage;

use crate::clients::{ClusterSource, UsageSource};
use crate::config::Job;
use crate::models::{Aggregated, Key};
use service_core::error::AppError;
use std::collections::BTreeMap;

pub async fn collect_usage(
    job: Job,
    cluster: &dyn ClusterSource,
    usage: &dyn UsageSource,
) -> Result<BTreeMap<Key, Aggregated>, AppError> {
    match job {
        Job::Dbaas => dbaas::collect(cluster, usage).await,
        Job::ObjectStorage => objectstorage::collect(cluster, usage).await,
    }
}
