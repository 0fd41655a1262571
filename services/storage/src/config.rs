use anyhow::{anyhow, bail, Result};
use image_pipeline::{PipelineConfig, PipelineMode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration shared by every entry point
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// AWS client configuration
    #[serde(default)]
    pub aws: AwsConfig,
    /// Metadata table configuration
    #[serde(default)]
    pub table: TableConfig,
    /// Upload bucket configuration
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Pipeline stage configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// AWS client configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AwsConfig {
    /// Region override; the default provider chain is used when unset
    pub region: Option<String>,
    /// Custom endpoint URL (for LocalStack and similar emulators)
    pub endpoint_url: Option<String>,
    /// Force path-style bucket addressing
    #[serde(default)]
    pub force_path_style: bool,
}

/// Metadata table configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TableConfig {
    /// Table name (`TABLE_NAME`)
    pub name: Option<String>,
}

/// Upload bucket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Bucket receiving uploads (`UPLOAD_BUCKET`)
    pub bucket: Option<String>,
    /// Presigned upload URL validity in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Extension of synthesized file names
    #[serde(default = "default_extension")]
    pub default_extension: String,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Age after which an INITIALIZED record counts as stuck
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Upper bound for record listings
    #[serde(default = "default_max_list_limit")]
    pub max_list_limit: usize,
}

// Default value functions
fn default_service_name() -> String {
    "image-logger".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_presigned_url_expiry_secs() -> u64 {
    300
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_stale_after_secs() -> u64 {
    900 // 15 minutes
}

fn default_max_list_limit() -> usize {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            presigned_url_expiry_secs: default_presigned_url_expiry_secs(),
            default_extension: default_extension(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            stale_after_secs: default_stale_after_secs(),
            max_list_limit: default_max_list_limit(),
        }
    }
}

/// Plain environment names set by the deployment, mapped to config keys
const PLAIN_ENV_KEYS: &[(&str, &str)] = &[
    ("TABLE_NAME", "table.name"),
    ("UPLOAD_BUCKET", "uploads.bucket"),
    ("TOPIC_ARN", "pipeline.topic_arn"),
];

impl Config {
    /// Load configuration from config files and the process environment
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    /// Load configuration, reading environment variables from `vars` instead
    /// of the process environment when given
    pub fn load_with_env(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let lookup = |name: &str| -> Option<String> {
            match vars {
                Some(ref map) => map.get(name).cloned(),
                None => std::env::var(name).ok(),
            }
            .filter(|v| !v.is_empty())
        };

        let mut builder = config::Config::builder()
            // Start with default values
            .set_default("service.name", default_service_name())?
            .set_default("service.log_level", default_log_level())?
            // Add config file if present
            .add_source(config::File::with_name("config/image-logger").required(false))
            .add_source(config::File::with_name("/etc/image-logger/config").required(false))
            // IMAGE_LOGGER__UPLOADS__PRESIGNED_URL_EXPIRY_SECS -> uploads.presigned_url_expiry_secs
            .add_source(
                config::Environment::with_prefix("IMAGE_LOGGER")
                    .separator("__")
                    .try_parsing(true)
                    .source(vars.clone()),
            );

        for (name, key) in PLAIN_ENV_KEYS {
            builder = builder.set_override_option(*key, lookup(name))?;
        }

        if let Some(mode) = lookup("PIPELINE_MODE") {
            let mode: PipelineMode = mode.parse()?;
            builder = builder.set_override("pipeline.mode", mode.as_str())?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the API cannot serve with
    pub fn validate(&self) -> Result<()> {
        if self.api.max_list_limit == 0 {
            bail!("api.max_list_limit must be at least 1");
        }

        if chrono::Duration::from_std(self.stale_after()).is_err() {
            bail!("api.stale_after_secs {} is out of range", self.api.stale_after_secs);
        }

        Ok(())
    }

    /// Table name, required by every stage that touches records
    pub fn table_name(&self) -> Result<&str> {
        self.table
            .name
            .as_deref()
            .ok_or_else(|| anyhow!("TABLE_NAME is not configured"))
    }

    /// Upload bucket, required by the URL issuer
    pub fn upload_bucket(&self) -> Result<&str> {
        self.uploads
            .bucket
            .as_deref()
            .ok_or_else(|| anyhow!("UPLOAD_BUCKET is not configured"))
    }

    /// Get presigned URL expiry as Duration
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.uploads.presigned_url_expiry_secs)
    }

    /// Get the stuck-record threshold as Duration
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.api.stale_after_secs)
    }
}
