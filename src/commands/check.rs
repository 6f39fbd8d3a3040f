//! Check command - one balance and ticker snapshot

use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};

use survivor_bot::ExchangeApi;

use super::{build_client, load_config, require_credentials, runtime};

pub fn run(config_path: Option<PathBuf>, symbols: Vec<String>) -> Result<()> {
    runtime()?.block_on(run_async(config_path, symbols))
}

async fn run_async(config_path: Option<PathBuf>, symbols: Vec<String>) -> Result<()> {
    let config = load_config(config_path, None)?;
    let credentials = require_credentials(&config.exchange)?;
    let client = build_client(&config.exchange, credentials)?;

    let symbols = if symbols.is_empty() {
        config.monitor.pairs.clone()
    } else {
        symbols
    };

    let balance = client.get_account_balance().await;
    if balance > 0.0 {
        info!("✅ Balance: ${:.2}", balance);
    } else {
        warn!("⚠️ Cannot fetch balance");
    }

    for symbol in &symbols {
        match client.get_ticker(symbol).await {
            Some(ticker) => info!("📊 {} price: {:.2} (ts {})", symbol, ticker.price, ticker.timestamp),
            None => warn!("No ticker for {}", symbol),
        }
    }

    Ok(())
}
