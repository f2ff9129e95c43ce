//! Usage observations and aggregation buckets.

use super::{Key, ObjectType};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw usage reported by the cloud billing API for one instance or bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    /// Instance identity, unique within a run.
    pub name: String,
    pub plan: String,
    /// Service type as reported by the provider (`pg`, `mysql`, `sos`, ...).
    pub resource_type: String,
    pub zone: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Measured amount; bytes for storage, ignored for instance counting.
    pub quantity: f64,
}

/// Managed resource as listed in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedResource {
    pub name: String,
    pub object_type: ObjectType,
    /// Value of the claim namespace label, if present.
    pub claim_namespace: Option<String>,
    /// Plan requested in the resource spec.
    pub plan: Option<String>,
    /// Zone requested in the resource spec.
    pub zone: Option<String>,
}

/// Managed resource joined with its owning tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detail {
    pub organization: String,
    pub name: String,
    pub namespace: String,
    /// Plan declared in the cluster; empty when the kind has none.
    pub plan: String,
    /// Zone declared in the cluster; empty when unknown.
    pub zone: String,
    /// Service type the managed resource declares.
    pub resource_type: String,
}

/// Accumulated usage for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregated {
    pub key: Key,
    pub organization: String,
    pub value: f64,
}
