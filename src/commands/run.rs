//! Run command - the balance monitor loop
//!
//! Stops on Ctrl+C after the current check finishes.

use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use survivor_bot::{monitor, HealthMonitor, VenueKind};

use super::{build_alerts, build_client, load_config, require_credentials, runtime};

pub fn run(config_path: Option<PathBuf>, venue: Option<VenueKind>) -> Result<()> {
    runtime()?.block_on(run_async(config_path, venue))
}

async fn run_async(config_path: Option<PathBuf>, venue: Option<VenueKind>) -> Result<()> {
    let config = load_config(config_path, venue)?;
    let credentials = require_credentials(&config.exchange)?;

    info!("Venue: {}", config.exchange.venue);
    info!("Poll interval: {}s", config.monitor.poll_interval_secs);
    info!("Failure threshold: {}", config.monitor.failure_threshold);

    let alerts = build_alerts(&config.alerts, &credentials)?;
    let client = build_client(&config.exchange, credentials)?;
    let mut health =
        HealthMonitor::with_threshold(client, alerts, config.monitor.failure_threshold);

    // Listening starts before the first check so Ctrl+C is never fatal.
    let shutdown = monitor::spawn_shutdown_listener(tokio::signal::ctrl_c());

    monitor::run(&mut health, config.monitor.poll_interval(), shutdown).await;
    Ok(())
}
