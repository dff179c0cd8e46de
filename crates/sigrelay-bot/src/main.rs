//! sigrelay entry point.

use anyhow::Result;
use clap::Parser;
use sigrelay_bot::config::DEFAULT_CONFIG_PATH;
use tracing::info;

/// Relay trade signals from chat messages to exchange venues.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGRELAY_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigrelay_telemetry::init_logging()?;

    info!("Starting sigrelay v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SIGRELAY_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGRELAY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = sigrelay_bot::AppConfig::load(&config_path)?;
    info!(
        read_only = config.read_only_mode,
        channels = config.target_channels.len(),
        "Configuration loaded"
    );

    let app = sigrelay_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
