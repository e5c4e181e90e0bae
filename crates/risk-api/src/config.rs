//! Server configuration

use anyhow::{Context, Result};
use risk_lib::service::{available_cores, ServiceConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, read from `RISK_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the model artifact manifest
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Version reported by the root endpoint
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// 0 means one per available core
    #[serde(default)]
    pub max_concurrent_inferences: usize,

    /// Exit at startup instead of serving without a model
    #[serde(default)]
    pub require_model: bool,
}

fn default_port() -> u16 {
    8000
}

fn default_model_path() -> PathBuf {
    std::env::var("MODEL_PATH")
        .unwrap_or_else(|_| "models/credit_risk_model.json".to_string())
        .into()
}

fn default_api_version() -> String {
    "1.0.0".to_string()
}

fn default_inference_timeout_ms() -> u64 {
    1000
}

fn default_max_batch_size() -> usize {
    1000
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("RISK").try_parsing(true))
            .build()
            .context("failed to read RISK_* environment")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let server: Self = config
            .try_deserialize()
            .context("invalid server configuration")?;

        anyhow::ensure!(
            server.inference_timeout_ms > 0,
            "inference_timeout_ms must be greater than 0"
        );
        Ok(server)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn service_config(&self) -> ServiceConfig {
        let max_concurrent_inferences = match self.max_concurrent_inferences {
            0 => available_cores(),
            n => n,
        };
        ServiceConfig {
            inference_timeout: self.inference_timeout(),
            max_batch_size: self.max_batch_size,
            max_concurrent_inferences,
        }
    }
}
