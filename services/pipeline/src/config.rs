//! Pipeline configuration.
//!
//! These structures are deserialized as the `pipeline` section of the
//! service configuration; every field has a default so an empty section is
//! valid for the enrichment-only entry points.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// What happens to an upload after its record is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Publish a dispatch message; enrichment runs in its own invocation
    #[default]
    FanOut,
    /// Label the object in the same invocation that wrote the record
    Direct,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::FanOut => "fan_out",
            PipelineMode::Direct => "direct",
        }
    }
}

impl FromStr for PipelineMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fan_out" | "fanout" => Ok(PipelineMode::FanOut),
            "direct" => Ok(PipelineMode::Direct),
            other => Err(ConfigError::InvalidValue {
                key: "pipeline.mode".to_string(),
                message: format!("unknown mode {other:?}"),
            }),
        }
    }
}

/// Label detection request policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelPolicy {
    /// Maximum number of labels requested per image
    #[serde(default = "default_max_labels")]
    pub max_labels: i32,
    /// Minimum confidence (percent) for a label to be returned
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_max_labels() -> i32 {
    5
}

fn default_min_confidence() -> f32 {
    70.0
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            max_labels: default_max_labels(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: PipelineMode,
    /// Topic receiving dispatch messages (required in fan-out mode)
    #[serde(default)]
    pub topic_arn: Option<String>,
    #[serde(default)]
    pub labels: LabelPolicy,
    /// Batch elements processed at once; 1 keeps strict sequential order
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Return an error to the trigger source when any element failed, so the
    /// batch is redelivered
    #[serde(default)]
    pub fail_batch_on_error: bool,
}

fn default_concurrency() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::default(),
            topic_arn: None,
            labels: LabelPolicy::default(),
            concurrency: default_concurrency(),
            fail_batch_on_error: false,
        }
    }
}

impl PipelineConfig {
    /// Check the settings needed by the upload entry point
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if !(1..=1000).contains(&self.labels.max_labels) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.labels.max_labels".to_string(),
                message: format!("{} is outside 1..=1000", self.labels.max_labels),
            });
        }

        if !(0.0..=100.0).contains(&self.labels.min_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.labels.min_confidence".to_string(),
                message: format!("{} is outside 0..=100", self.labels.min_confidence),
            });
        }

        if self.mode == PipelineMode::FanOut && self.topic_arn.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::MissingRequired("pipeline.topic_arn".to_string()));
        }

        Ok(())
    }

    /// Topic for dispatch messages
    pub fn topic(&self) -> Result<&str, ConfigError> {
        self.topic_arn
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingRequired("pipeline.topic_arn".to_string()))
    }
}
