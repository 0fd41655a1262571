use anyhow::Context;
use image_storage::{context, lambda, telemetry, Config};
use lambda_runtime::{run, service_fn, Error};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.service.log_level);

    let sdk_config = context::load_aws_config(&config.aws).await;
    let issuer = context::upload_url_issuer(&config, &sdk_config)?;

    info!(
        expiry_secs = issuer.expiry().as_secs(),
        "Upload URL issuer ready"
    );

    run(service_fn(|event| lambda::upload_url(&issuer, event))).await
}
