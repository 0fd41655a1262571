//! Label detection seam and its Rekognition implementation.

use crate::config::LabelPolicy;
use async_trait::async_trait;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::types::{Image, S3Object};
use aws_sdk_rekognition::Client as RekognitionClient;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors returned by label detectors
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Label detection failed for {bucket}/{key}: {message}")]
    Service {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Image reference plus request policy
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRequest {
    pub bucket: String,
    pub key: String,
    pub max_labels: i32,
    pub min_confidence: f32,
}

impl LabelRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, policy: &LabelPolicy) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            max_labels: policy.max_labels,
            min_confidence: policy.min_confidence,
        }
    }
}

/// One label returned by the detector
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
}

/// Detects descriptive labels for a stored image
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect_labels(&self, request: &LabelRequest) -> Result<Vec<DetectedLabel>, DetectError>;
}

/// Reduce detector output to the label names recorded on the upload, in the
/// order returned, capped at the requested maximum
pub fn label_names(labels: Vec<DetectedLabel>, max_labels: i32) -> Vec<String> {
    labels
        .into_iter()
        .map(|l| l.name)
        .filter(|name| !name.is_empty())
        .take(max_labels.max(0) as usize)
        .collect()
}

/// Rekognition-backed detector
pub struct RekognitionDetector {
    client: RekognitionClient,
}

impl RekognitionDetector {
    pub fn new(client: RekognitionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LabelDetector for RekognitionDetector {
    #[instrument(skip(self), fields(bucket = %request.bucket, key = %request.key))]
    async fn detect_labels(&self, request: &LabelRequest) -> Result<Vec<DetectedLabel>, DetectError> {
        let image = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&request.bucket)
                    .name(&request.key)
                    .build(),
            )
            .build();

        let output = self
            .client
            .detect_labels()
            .image(image)
            .max_labels(request.max_labels)
            .min_confidence(request.min_confidence)
            .send()
            .await
            .map_err(|e| DetectError::Service {
                bucket: request.bucket.clone(),
                key: request.key.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let labels: Vec<DetectedLabel> = output
            .labels()
            .iter()
            .filter_map(|label| {
                label.name().map(|name| DetectedLabel {
                    name: name.to_string(),
                    confidence: label.confidence().unwrap_or_default(),
                })
            })
            .collect();

        debug!(count = labels.len(), "Labels detected");

        Ok(labels)
    }
}
