//! Tickstream Watch binary.
//!
//! Entry point for the service that watches streaming channels.

use anyhow::Context;
use tickstream_watch::{WatchConfig, WatchService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tickstream_sdk=debug,tickstream_watch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WatchConfig::from_env().context("failed to load configuration")?;

    tracing::info!("Starting Tickstream Watch");
    tracing::info!("Stream URL: {}", config.ws_url);
    tracing::info!("API URL: {}", config.api_url);

    let service = WatchService::new(config).context("failed to start watch service")?;

    service
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await;

    Ok(())
}
