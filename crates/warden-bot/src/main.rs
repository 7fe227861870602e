//! Trading permission gate - Entry Point
//!
//! Replays market bars through the witness layer, risk engine and state
//! machine, trading on paper.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Trading permission gate
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via WARDEN_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the replay feed path from the configuration
    #[arg(long)]
    feed: Option<String>,

    /// Write the Prometheus text exposition here on shutdown
    #[arg(long)]
    metrics_out: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    warden_telemetry::init_logging()?;

    info!("Starting warden v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > WARDEN_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("WARDEN_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = warden_bot::AppConfig::from_file(&config_path)?;
    if let Some(feed) = args.feed {
        config.feed.path = feed;
    }
    info!(feed = %config.feed.path, symbol = %config.feed.symbol, "Configuration loaded");

    let app = warden_bot::Application::new(config)?;
    let summary = app.run().await?;

    info!(
        final_state = %summary.final_state,
        trades = summary.trades,
        "Shutdown complete"
    );
    if let Some(path) = args.metrics_out {
        std::fs::write(&path, warden_telemetry::Metrics::gather_text()?)?;
        info!(path = %path, "Metrics written");
    }

    Ok(())
}
