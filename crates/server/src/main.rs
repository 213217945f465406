mod billing;
mod bootstrap;
mod catalog;
mod health;
mod line_api;
mod llm;
mod webhook;

use anyhow::Result;
use meshitomo_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use meshitomo_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %app.config.server.bind_address,
        port = app.config.server.port,
        "meshitomo-server started"
    );

    app.serve().await?;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "meshitomo-server stopped"
    );

    Ok(())
}
