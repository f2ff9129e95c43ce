//! Exoscale v2 API client for DBaaS services and SOS bucket usage.

use super::{status_error, transport_error, UsageSource};
use crate::config::ExoscaleConfig;
use crate::models::{ObjectType, UsageRecord, STORAGE_PLAN};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use service_core::error::AppError;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "Exoscale API";

/// Lifetime of a request signature.
const SIGNATURE_TTL_SECS: i64 = 600;

#[derive(Debug, Deserialize)]
struct DbaasServiceList {
    #[serde(rename = "dbaas-services", default)]
    services: Vec<DbaasService>,
}

#[derive(Debug, Deserialize)]
struct DbaasService {
    name: String,
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    plan: String,
    #[serde(rename = "created-at", default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BucketUsageList {
    #[serde(rename = "sos-buckets-usage", default)]
    buckets: Vec<BucketUsage>,
}

#[derive(Debug, Deserialize)]
struct BucketUsage {
    name: String,
    #[serde(rename = "zone-name", default)]
    zone_name: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(rename = "created-at", default)]
    created_at: Option<DateTime<Utc>>,
}

/// Signature over `METHOD path`, body, signed query values, signed header
/// values and the expiry, as Exoscale's EXO2-HMAC-SHA256 scheme defines it.
pub fn sign_request(
    secret: &str,
    method: &str,
    path: &str,
    body: &str,
    expires: i64,
) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid API secret: {}", e)))?;

    let message = format!("{} {}\n{}\n\n\n{}", method, path, body, expires);
    mac.update(message.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct ExoscaleClient {
    config: ExoscaleConfig,
    api_secret: Secret<String>,
    client: Client,
    max_elapsed: Duration,
}

impl ExoscaleClient {
    pub fn new(config: &ExoscaleConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config: config.clone(),
            api_secret: config.api_secret.clone(),
            client,
            max_elapsed: Duration::from_secs(120),
        })
    }

    /// Upper bound on the time spent retrying one request.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    fn authorization(&self, path: &str, expires: i64) -> Result<String, AppError> {
        let signature = sign_request(self.api_secret.expose_secret(), "GET", path, "", expires)?;
        Ok(format!(
            "EXO2-HMAC-SHA256 credential={},expires={},signature={}",
            self.config.api_key, expires, signature
        ))
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T, AppError> {
        let expires = Utc::now().timestamp() + SIGNATURE_TTL_SECS;
        let authorization = self.authorization(url.path(), expires)?;

        let response = self
            .client
            .get(url.clone())
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(SERVICE, status, &body));
        }

        response.json().await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "Failed to parse {} response: {}",
                url.path(),
                e
            ))
        })
    }

    /// GET `resource` in `zone`, retrying transient failures.
    async fn get<T: DeserializeOwned + Send>(&self, zone: &str, resource: &str) -> Result<T, AppError> {
        let url = format!("{}/{}", self.config.endpoint(zone).trim_end_matches('/'), resource);
        let url = Url::parse(&url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid endpoint {}: {}", url, e)))?;

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            self.get_once(&url).await.map_err(|e| {
                if e.is_transient() {
                    warn!(zone = %zone, resource = %resource, error = %e, "Transient API failure, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }
}

#[async_trait]
impl UsageSource for ExoscaleClient {
    #[instrument(skip(self))]
    async fn database_usage(&self) -> Result<Vec<UsageRecord>, AppError> {
        let mut usage = Vec::new();
        for zone in &self.config.zones {
            let list: DbaasServiceList = self.get(zone, "dbaas-service").await?;
            debug!(zone = %zone, services = list.services.len(), "Fetched DBaaS services");
            usage.extend(list.services.into_iter().map(|s| UsageRecord {
                name: s.name,
                plan: s.plan,
                resource_type: s.service_type,
                zone: zone.clone(),
                created_at: s.created_at,
                quantity: 1.0,
            }));
        }
        info!(services = usage.len(), "Fetched DBaaS usage");
        Ok(usage)
    }

    #[instrument(skip(self))]
    async fn storage_usage(&self) -> Result<Vec<UsageRecord>, AppError> {
        let mut usage = Vec::new();
        for zone in &self.config.zones {
            let list: BucketUsageList = self.get(zone, "sos-buckets-usage").await?;
            debug!(zone = %zone, buckets = list.buckets.len(), "Fetched bucket usage");
            usage.extend(list.buckets.into_iter().map(|b| UsageRecord {
                name: b.name,
                plan: STORAGE_PLAN.to_string(),
                resource_type: ObjectType::ObjectStorage.service_type().to_string(),
                zone: b.zone_name.unwrap_or_else(|| zone.clone()),
                created_at: b.created_at,
                quantity: b.size as f64,
            }));
        }
        info!(buckets = usage.len(), "Fetched bucket usage");
        Ok(usage)
    }
}
