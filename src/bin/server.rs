//! Rustrade Server - headless real-time trading engine.
//!
//! Runs the event-driven pipeline (decision -> execution -> notification ->
//! position monitoring) as a single long-running process. Metrics are pushed
//! via structured JSON logs to stdout - no HTTP server, no incoming
//! connections.
//!
//! # Usage
//! ```sh
//! OBSERVABILITY_INTERVAL=60 cargo run --bin server
//! cargo run --bin server -- --config custom.env --dry-run
//! ```

use anyhow::Result;
use clap::Parser;
use rustrade::application::system::System;
use rustrade::config::Config;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "server", about = "Headless real-time trading engine")]
struct Cli {
    /// Path to the .env file to load before reading configuration.
    #[arg(long, default_value = ".env")]
    config: String,

    /// Build and validate the dependency graph, then exit without running.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if dotenvy::from_filename(&cli.config).is_err() {
        dotenvy::dotenv().ok();
    }

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Rustrade Server {} starting...", env!("CARGO_PKG_VERSION"));
    info!("Mode: HEADLESS (no HTTP server)");

    let config = Config::from_env()?;
    info!(mode = ?config.mode, symbols = ?config.risk.symbols, "configuration loaded");

    info!("building and starting trading system...");
    let system = System::start(config.clone()).await?;
    info!("trading system running.");

    if cli.dry_run {
        info!("--dry-run: dependency graph built successfully, shutting down");
        system.shutdown().await;
        return Ok(());
    }

    let interval = std::env::var("OBSERVABILITY_INTERVAL")
        .unwrap_or_else(|_| "60".to_string())
        .parse::<u64>()
        .unwrap_or(60);

    if config.observability.enabled {
        let reporter = rustrade::infrastructure::observability::MetricsReporter::new(
            system.metrics.clone(),
            interval,
        );
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!(interval_seconds = interval, "metrics reporter started");
    } else {
        info!("metrics reporting disabled");
    }

    info!("server running. Press Ctrl+C to shut down.");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, disconnecting exchanges...");
    system.shutdown().await;
    info!("shutdown complete.");

    Ok(())
}
