use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Settings every collector binary shares.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "metrics-collector".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        load()
    }
}

/// Load a configuration value from the optional `configuration` file and the
/// `APP__`-prefixed environment, with `.env` applied first.
pub fn load<T: DeserializeOwned>() -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
