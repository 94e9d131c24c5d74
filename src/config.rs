//! Configuration management for the delivery time estimator

use crate::types::order::InputLimits;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "DELIVERY_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub assets: AssetsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming estimate requests
    pub request_subject: String,
    /// Subject for replies when a request carries no reply inbox
    pub estimate_subject: String,
    /// Queue group shared by estimator instances (plain subscription when unset)
    #[serde(default)]
    pub queue_group: Option<String>,
}

/// Trained artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// ONNX regression model
    pub model_path: String,
    /// JSON array of feature column names, in training order
    pub manifest_path: String,
    /// JSON object of per-field baseline categories
    pub baselines_path: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Accepted market and order-protocol identifiers
    #[serde(default)]
    pub input_limits: InputLimits,
}

fn default_report_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `DELIVERY_CONFIG` or `config/config.toml`
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/config.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// `DELIVERY__SECTION__KEY` environment variables override file values.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("DELIVERY").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "delivery.estimate.request".to_string(),
                estimate_subject: "delivery.estimate.result".to_string(),
                queue_group: Some("delivery-estimators".to_string()),
            },
            assets: AssetsConfig {
                model_path: "assets/model_final_project.onnx".to_string(),
                manifest_path: "assets/final_features.json".to_string(),
                baselines_path: "assets/category_baselines.json".to_string(),
                onnx_threads: 1,
            },
            pipeline: PipelineConfig {
                workers: 4,
                report_interval_secs: 30,
                input_limits: InputLimits::default(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
