//! Startup wiring: one shared AWS configuration per process and the clients
//! every entry point is built from.

use crate::config::{AwsConfig, Config};
use crate::metadata_store::DynamoMetadataStore;
use crate::presigned_urls::{AppState, UploadUrlIssuer};
use crate::s3_presigner::S3Presigner;
use anyhow::Result;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use image_pipeline::{PipelineContext, RekognitionDetector, SnsPublisher};
use std::sync::Arc;
use tracing::info;

/// Load the shared SDK configuration, applying region and endpoint overrides
pub async fn load_aws_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(ref region) = config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    // Custom endpoint for LocalStack and similar emulators
    if let Some(ref endpoint_url) = config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    let sdk_config = loader.load().await;

    info!(
        region = sdk_config.region().map(|r| r.as_ref()).unwrap_or("default"),
        endpoint = config.endpoint_url.as_deref().unwrap_or("default"),
        "AWS configuration loaded"
    );

    sdk_config
}

/// S3 client honoring path-style addressing for emulators
pub fn s3_client(sdk_config: &SdkConfig, config: &AwsConfig) -> aws_sdk_s3::Client {
    let builder = S3ConfigBuilder::from(sdk_config).force_path_style(config.force_path_style);
    aws_sdk_s3::Client::from_conf(builder.build())
}

/// Metadata table adapter for the configured table
pub fn metadata_store(config: &Config, sdk_config: &SdkConfig) -> Result<DynamoMetadataStore> {
    Ok(DynamoMetadataStore::new(
        aws_sdk_dynamodb::Client::new(sdk_config),
        config.table_name()?,
    ))
}

/// Collaborators for the pipeline stages. The publisher is only built when a
/// topic is configured; handlers report a missing one as a configuration
/// error in fan-out mode.
pub fn pipeline_context(config: &Config, sdk_config: &SdkConfig) -> Result<PipelineContext> {
    let table = Arc::new(metadata_store(config, sdk_config)?);
    let detector = Arc::new(RekognitionDetector::new(aws_sdk_rekognition::Client::new(sdk_config)));

    let mut ctx = PipelineContext::new(table, config.pipeline.clone()).with_detector(detector);

    if config.pipeline.topic_arn.is_some() {
        let publisher = Arc::new(SnsPublisher::new(aws_sdk_sns::Client::new(sdk_config)));
        ctx = ctx.with_publisher(publisher);
    }

    Ok(ctx)
}

/// Upload URL issuer for the configured bucket
pub fn upload_url_issuer(config: &Config, sdk_config: &SdkConfig) -> Result<UploadUrlIssuer> {
    let presigner = Arc::new(S3Presigner::new(s3_client(sdk_config, &config.aws)));

    Ok(UploadUrlIssuer::new(
        presigner,
        config.upload_bucket()?,
        config.presigned_url_expiry(),
        config.uploads.default_extension.clone(),
    ))
}

/// State for the HTTP API
pub fn app_state(config: &Config, sdk_config: &SdkConfig) -> Result<AppState> {
    Ok(AppState {
        issuer: Arc::new(upload_url_issuer(config, sdk_config)?),
        table: Arc::new(metadata_store(config, sdk_config)?),
        stale_after: config.stale_after(),
        max_list_limit: config.api.max_list_limit,
    })
}
