//! Sensorhub CLI
//!
//! Command-line interface for the sensor platform dashboard service.

use std::path::PathBuf;

use clap::Parser;
use sensorhub::{load_config, Config, SensorhubBuilder};
use tracing::Level;

#[derive(Parser)]
#[command(name = "sensorhub")]
#[command(about = "Role-gated dashboard service for the IoT sensor platform")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dashboard port (overrides config file)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// REST backend base URL (overrides config file and environment)
    #[arg(long)]
    api_url: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, dashboard_port={:?}, api_url={:?}, log_level={:?}",
        args.config,
        args.dashboard_port,
        args.api_url,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.apply_env();

    if let Some(api_url) = args.api_url {
        config.api.base_url = api_url;
    }
    if let Some(dashboard_port) = args.dashboard_port {
        config.dashboard.port = dashboard_port;
    }

    tracing::info!("Starting sensorhub service");
    tracing::debug!(
        "Backend: {}, sensor ranges: {}",
        config.api.base_url,
        config.sensor_ranges.len()
    );

    SensorhubBuilder::new(config).build()?.start().await?;

    Ok(())
}
