use chrono::{Duration, NaiveDate, Utc};
use secrecy::Secret;
use serde::{Deserialize, Deserializer};
use service_core::error::AppError;
use std::path::PathBuf;

/// Which usage the run collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Job {
    Dbaas,
    #[serde(alias = "object-storage")]
    ObjectStorage,
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::Dbaas => "dbaas",
            Job::ObjectStorage => "objectstorage",
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct CollectorConfig {
    #[serde(flatten)]
    pub common: service_core::config::Config,
    pub job: Job,
    /// Day to bill; yesterday (UTC) when unset.
    #[serde(default)]
    pub billing_date: Option<NaiveDate>,
    /// Record facts in memory only.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub run_migrations: bool,
    /// Required unless `dry_run` is set.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    pub cluster: ClusterConfig,
    pub exoscale: ExoscaleConfig,
    /// Billing catalog file; the built-in Exoscale catalog is used when unset.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    /// Prometheus text-format output written at the end of the run.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ClusterConfig {
    /// Kubernetes API server URL.
    pub url: String,
    pub token: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ExoscaleConfig {
    pub api_key: String,
    pub api_secret: Secret<String>,
    #[serde(default = "default_zones", deserialize_with = "deserialize_zones")]
    pub zones: Vec<String>,
    /// API base URL; `{zone}` is replaced per zone.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
}

impl ExoscaleConfig {
    pub fn endpoint(&self, zone: &str) -> String {
        self.endpoint_template.replace("{zone}", zone)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_zones() -> Vec<String> {
    ["ch-gva-2", "ch-dk-2", "de-fra-1", "de-muc-1", "at-vie-1", "bg-sof-1"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_endpoint_template() -> String {
    "https://api-{zone}.exoscale.com/v2".to_string()
}

/// Zones arrive either as a list (configuration file) or as a comma
/// separated string (environment).
fn deserialize_zones<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Zones {
        List(Vec<String>),
        Csv(String),
    }

    let zones = match Zones::deserialize(deserializer)? {
        Zones::List(zones) => zones,
        Zones::Csv(csv) => csv.split(',').map(|z| z.trim().to_string()).collect(),
    };
    Ok(zones.into_iter().filter(|z| !z.is_empty()).collect())
}

impl CollectorConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: Self = service_core::config::load()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.dry_run && self.database.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "database configuration is required unless dry_run is set"
            )));
        }
        if self.exoscale.zones.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "at least one Exoscale zone must be configured"
            )));
        }
        Ok(())
    }

    /// The configured billing date, or yesterday in UTC.
    pub fn billing_date(&self) -> NaiveDate {
        self.billing_date
            .unwrap_or_else(|| (Utc::now() - Duration::days(1)).date_naive())
    }
}
