//! Marketplace price watcher - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Watch marketplace item prices and log threshold alerts.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via MW_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the first wss:// handshake
    mw_ws::init_crypto();

    let args = Args::parse();

    mw_telemetry::init_logging()?;

    info!("Starting mw-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > MW_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("MW_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = mw_bot::AppConfig::from_file(&config_path)?;
    info!(
        feed_url = %config.feed.url,
        items = config.items.len(),
        polling = config.rest.is_some(),
        "Configuration loaded"
    );

    let app = mw_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
