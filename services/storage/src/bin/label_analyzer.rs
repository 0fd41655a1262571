use anyhow::Context;
use image_storage::{context, lambda, telemetry, Config};
use image_pipeline::AnalysisEventHandler;
use lambda_runtime::{run, service_fn, Error};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.service.log_level);

    let sdk_config = context::load_aws_config(&config.aws).await;
    let ctx = context::pipeline_context(&config, &sdk_config)?;
    let handler = AnalysisEventHandler::new(&ctx).context("Invalid pipeline configuration")?;

    info!(
        max_labels = config.pipeline.labels.max_labels,
        min_confidence = config.pipeline.labels.min_confidence,
        "Label analyzer ready"
    );

    run(service_fn(|event| lambda::label_analyzer(&handler, event))).await
}
