use anyhow::{Context, Result};
use clap::Parser;

use price_tracker::cli::{self, Cli};
use price_tracker::{AppConfig, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Keeps the file writer flushing until exit
    let _guard = telemetry::init_tracing(&config.logging)?;

    if config.metrics.enabled {
        telemetry::install_metrics(&config.metrics)?;
    }

    tracing::debug!("Starting price tracker");
    cli::run(cli, config).await
}
