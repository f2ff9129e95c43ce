//! Billable object types and their source-string identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud provider all collected usage is attributed to.
pub const PROVIDER: &str = "exoscale";

/// Plan component of object storage keys; buckets have no plan.
pub const STORAGE_PLAN: &str = "default";

/// How raw usage of an object type is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// One unit per running instance.
    Instances,
    /// Stored size in bytes.
    Bytes,
}

impl Measure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::Instances => "instances",
            Measure::Bytes => "bytes",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billable object type. Selects the source string, query and measurement of
/// a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "object-storage-storage")]
    ObjectStorage,
    #[serde(rename = "dbaas-postgres")]
    Postgres,
    #[serde(rename = "dbaas-mysql")]
    Mysql,
    #[serde(rename = "dbaas-opensearch")]
    OpenSearch,
    #[serde(rename = "dbaas-redis")]
    Redis,
    #[serde(rename = "dbaas-kafka")]
    Kafka,
}

impl ObjectType {
    pub const DBAAS: [ObjectType; 5] = [
        ObjectType::Postgres,
        ObjectType::Mysql,
        ObjectType::OpenSearch,
        ObjectType::Redis,
        ObjectType::Kafka,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::ObjectStorage => "object-storage-storage",
            ObjectType::Postgres => "dbaas-postgres",
            ObjectType::Mysql => "dbaas-mysql",
            ObjectType::OpenSearch => "dbaas-opensearch",
            ObjectType::Redis => "dbaas-redis",
            ObjectType::Kafka => "dbaas-kafka",
        }
    }

    /// Service type reported by the cloud billing API, used as the key's
    /// resource type.
    pub fn service_type(&self) -> &'static str {
        match self {
            ObjectType::ObjectStorage => "sos",
            ObjectType::Postgres => "pg",
            ObjectType::Mysql => "mysql",
            ObjectType::OpenSearch => "opensearch",
            ObjectType::Redis => "redis",
            ObjectType::Kafka => "kafka",
        }
    }

    pub fn from_service_type(service_type: &str) -> Option<Self> {
        match service_type {
            "sos" => Some(ObjectType::ObjectStorage),
            "pg" => Some(ObjectType::Postgres),
            "mysql" => Some(ObjectType::Mysql),
            "opensearch" => Some(ObjectType::OpenSearch),
            "redis" => Some(ObjectType::Redis),
            "kafka" => Some(ObjectType::Kafka),
            _ => None,
        }
    }

    /// Plural resource name of the managed resource in the cluster.
    pub fn managed_resource(&self) -> &'static str {
        match self {
            ObjectType::ObjectStorage => "buckets",
            ObjectType::Postgres => "postgresqls",
            ObjectType::Mysql => "mysqls",
            ObjectType::OpenSearch => "opensearches",
            ObjectType::Redis => "redis",
            ObjectType::Kafka => "kafkas",
        }
    }

    pub fn measure(&self) -> Measure {
        match self {
            ObjectType::ObjectStorage => Measure::Bytes,
            _ => Measure::Instances,
        }
    }

    /// Products of database services are priced per plan.
    pub fn priced_per_plan(&self) -> bool {
        self.measure() == Measure::Instances
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity used to match products, discounts and queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceString {
    pub object_type: ObjectType,
    pub provider: String,
    pub plan: Option<String>,
}

impl SourceString {
    pub fn new(object_type: ObjectType, plan: &str) -> Self {
        Self {
            object_type,
            provider: PROVIDER.to_string(),
            plan: object_type
                .priced_per_plan()
                .then(|| plan.to_string())
                .filter(|p| !p.is_empty()),
        }
    }

    /// `object_type:provider[:plan]`, matched against product and discount sources.
    pub fn source(&self) -> String {
        match &self.plan {
            Some(plan) => format!("{}:{}:{}", self.object_type, self.provider, plan),
            None => self.query_name(),
        }
    }

    /// `object_type:provider`, the exact name of the query.
    pub fn query_name(&self) -> String {
        format!("{}:{}", self.object_type, self.provider)
    }
}
