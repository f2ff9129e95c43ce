//! Collaborators the jobs fetch usage and ownership data from.

pub mod cluster;
pub mod exoscale;

pub use cluster::ClusterClient;
pub use exoscale::ExoscaleClient;

use crate::models::{ManagedResource, ObjectType, UsageRecord};
use async_trait::async_trait;
use reqwest::StatusCode;
use service_core::error::AppError;
use std::collections::HashMap;

/// Tenant ownership as recorded in the cluster.
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Namespace name → organization, for labelled namespaces only.
    async fn organizations_by_namespace(&self) -> Result<HashMap<String, String>, AppError>;

    /// Managed resources of one kind. A kind the cluster does not serve
    /// yields an empty list.
    async fn managed_resources(
        &self,
        object_type: ObjectType,
    ) -> Result<Vec<ManagedResource>, AppError>;
}

/// Raw usage from the cloud billing API, concatenated across zones.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn database_usage(&self) -> Result<Vec<UsageRecord>, AppError>;

    async fn storage_usage(&self) -> Result<Vec<UsageRecord>, AppError>;
}

/// Map a non-success response to an error; gateway and throttling failures
/// are transient.
pub(crate) fn status_error(service: &str, status: StatusCode, body: &str) -> AppError {
    let message = format!("{} returned {}: {}", service, status, body);
    match status {
        StatusCode::NOT_FOUND => AppError::NotFound(anyhow::anyhow!(message)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::Unauthorized(anyhow::anyhow!(message))
        }
        StatusCode::SERVICE_UNAVAILABLE => AppError::ServiceUnavailable,
        StatusCode::TOO_MANY_REQUESTS => AppError::BadGateway(message),
        s if s.is_server_error() => AppError::BadGateway(message),
        _ => AppError::InternalError(anyhow::anyhow!(message)),
    }
}

pub(crate) fn transport_error(service: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AppError::BadGateway(format!("Failed to reach {}: {}", service, err))
    } else {
        AppError::InternalError(anyhow::anyhow!("{} request failed: {}", service, err))
    }
}
