use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PresignError {
    #[error("Invalid presigning expiry: {0}")]
    InvalidExpiry(String),

    #[error("Failed to presign {bucket}/{key}: {message}")]
    Signing {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Produces time-limited upload URLs for the upload bucket
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadPresigner: Send + Sync {
    /// Presign a `PUT` of `key` into `bucket`, valid for `expires_in`
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, PresignError>;
}

/// Presigner backed by the S3 client's local signing
pub struct S3Presigner {
    client: S3Client,
}

impl S3Presigner {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UploadPresigner for S3Presigner {
    async fn presign_put(
        &self,
        bucket: &str,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, PresignError> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| PresignError::InvalidExpiry(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| PresignError::Signing {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket, key, "Upload URL presigned");

        Ok(presigned.uri().to_string())
    }
}
