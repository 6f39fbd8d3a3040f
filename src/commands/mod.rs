//! Subcommand implementations and shared startup helpers

pub mod check;
pub mod credentials;
pub mod run;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use survivor_bot::config::{load_credentials, AlertSettings, ExchangeSettings};
use survivor_bot::exchange::{Credentials, ExchangeClient};
use survivor_bot::{AlertSink, LogOnlyAlerter, MonitorConfig, TelegramAlerter, VenueKind};

/// Load the config file (or defaults) and apply a CLI venue override
pub fn load_config(path: Option<PathBuf>, venue: Option<VenueKind>) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::load(path.as_deref()).context("Failed to load config")?;
    if let Some(venue) = venue {
        config.exchange.venue = venue;
    }
    Ok(config)
}

/// Credentials are required; a missing key aborts startup
pub fn require_credentials(settings: &ExchangeSettings) -> Result<Credentials> {
    load_credentials(settings)
        .with_context(|| format!("Cannot start without {} credentials", settings.venue))
}

pub fn build_client(settings: &ExchangeSettings, credentials: Credentials) -> Result<ExchangeClient> {
    let venue = settings.venue.build(settings.base_url.as_deref());
    info!("Exchange: {} ({})", venue.name(), venue.base_url());
    ExchangeClient::new(venue, credentials, settings.client_config())
        .context("Failed to build exchange client")
}

pub fn build_alerts(settings: &AlertSettings, credentials: &Credentials) -> Result<Box<dyn AlertSink>> {
    if !settings.enabled {
        warn!("Telegram alerts disabled, alerts go to the log only");
        return Ok(Box::new(LogOnlyAlerter));
    }

    let alerter = TelegramAlerter::with_api_base(
        settings.api_base.clone(),
        credentials.alert_token(),
        credentials.alert_channel(),
        Duration::from_secs(settings.timeout_secs),
    )
    .context("Failed to build Telegram client")?;
    Ok(Box::new(alerter))
}

/// Multi-threaded runtime for the async commands
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}
