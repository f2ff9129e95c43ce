//! Kubernetes API access for namespaces and Crossplane managed resources.

use super::{status_error, transport_error, ClusterSource};
use crate::config::ClusterConfig;
use crate::models::{ManagedResource, ObjectType};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const ORGANIZATION_LABEL: &str = "appuio.io/organization";
pub const CLAIM_NAMESPACE_LABEL: &str = "crossplane.io/claim-namespace";
pub const MANAGED_RESOURCE_GROUP: &str = "exoscale.crossplane.io";
pub const MANAGED_RESOURCE_VERSION: &str = "v1";

const SERVICE: &str = "Kubernetes API";

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<Object>,
}

#[derive(Debug, Deserialize)]
struct Object {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: ObjectSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectSpec {
    #[serde(rename = "forProvider", default)]
    for_provider: ForProvider,
}

#[derive(Debug, Default, Deserialize)]
struct ForProvider {
    #[serde(default)]
    size: Option<InstanceSize>,
    #[serde(default)]
    zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceSize {
    plan: String,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

pub struct ClusterClient {
    base_url: String,
    token: Secret<String>,
    client: Client,
}

impl ClusterClient {
    pub fn new(config: &ClusterConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client,
        })
    }

    /// GET a list endpoint; `None` when the cluster does not serve it.
    async fn list(&self, path: &str) -> Result<Option<ObjectList>, AppError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Listing cluster objects");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(SERVICE, status, &body));
        }

        let list = response.json().await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!("Failed to parse {} response: {}", path, e))
        })?;
        Ok(Some(list))
    }
}

#[async_trait]
impl ClusterSource for ClusterClient {
    #[instrument(skip(self))]
    async fn organizations_by_namespace(&self) -> Result<HashMap<String, String>, AppError> {
        let list = self
            .list("/api/v1/namespaces")
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Namespace API is not served")))?;

        let organizations = namespace_organizations(list);
        info!(namespaces = organizations.len(), "Fetched namespaces with organization");
        Ok(organizations)
    }

    #[instrument(skip(self))]
    async fn managed_resources(
        &self,
        object_type: ObjectType,
    ) -> Result<Vec<ManagedResource>, AppError> {
        let path = format!(
            "/apis/{}/{}/{}",
            MANAGED_RESOURCE_GROUP,
            MANAGED_RESOURCE_VERSION,
            object_type.managed_resource()
        );
        let Some(list) = self.list(&path).await? else {
            warn!(
                resource = object_type.managed_resource(),
                "Managed resource kind is not served by the cluster, skipping"
            );
            return Ok(Vec::new());
        };

        let resources = managed_resources(list, object_type);
        info!(count = resources.len(), "Fetched managed resources");
        Ok(resources)
    }
}

fn namespace_organizations(list: ObjectList) -> HashMap<String, String> {
    list.items
        .into_iter()
        .filter_map(|ns| {
            let mut labels = ns.metadata.labels;
            match labels.remove(ORGANIZATION_LABEL) {
                Some(org) if !org.is_empty() => Some((ns.metadata.name, org)),
                _ => {
                    debug!(namespace = %ns.metadata.name, "Namespace has no organization label");
                    None
                }
            }
        })
        .collect()
}

fn managed_resources(list: ObjectList, object_type: ObjectType) -> Vec<ManagedResource> {
    list.items
        .into_iter()
        .map(|item| {
            let mut labels = item.metadata.labels;
            let for_provider = item.spec.for_provider;
            ManagedResource {
                name: item.metadata.name,
                object_type,
                claim_namespace: labels.remove(CLAIM_NAMESPACE_LABEL),
                plan: for_provider.size.map(|size| size.plan),
                zone: for_provider.zone,
            }
        })
        .collect()
}
