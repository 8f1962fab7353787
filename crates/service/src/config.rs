//! Service configuration

use serde::Deserialize;
use sleep_lib::{ModelKind, Result};
use std::path::PathBuf;

/// Service configuration, read from `SLEEP_SERVICE_*` environment variables
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port for predict/health/metrics
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the artifact set written by `sleepctl train`
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Serve this variant instead of the manifest's deployed one
    #[serde(default)]
    pub model_variant: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model_dir: default_model_dir(),
            model_variant: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("SLEEP_SERVICE"))
    }

    pub fn from_environment(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.prefix_separator("_").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed variant override, if any
    pub fn variant(&self) -> Result<Option<ModelKind>> {
        self.model_variant
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(str::parse)
            .transpose()
    }
}
