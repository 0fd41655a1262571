use anyhow::{Context, Result};
use image_storage::presigned_urls::start_api_server;
use image_storage::{context, telemetry, Config};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    telemetry::init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting image storage API"
    );

    // Initialize metrics
    telemetry::init_metrics(config.service.metrics_port)?;

    let sdk_config = context::load_aws_config(&config.aws).await;
    let state = context::app_state(&config, &sdk_config)
        .context("Failed to initialize API state")?;

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Image storage API stopped");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
