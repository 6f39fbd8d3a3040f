//! Survivor Bot
//!
//! A small watchdog for a crypto exchange account. It polls the trade-account
//! USDT balance through a signed REST client and alerts an operator over
//! Telegram when the balance cannot be fetched several times in a row.
//!
//! The exchange client never returns errors to callers. Retries, rate limits
//! and implausible values are handled inside and each operation falls back to
//! a sentinel (`0.0`, `None` or an empty list).
//!
//! ## Example
//! ```no_run
//! use survivor_bot::exchange::{ClientConfig, Credentials, ExchangeApi, ExchangeClient, VenueKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::new("key", "secret", "passphrase", "token", "chat");
//!     let client = ExchangeClient::new(
//!         VenueKind::Kucoin.build(None),
//!         credentials,
//!         ClientConfig::default(),
//!     )?;
//!     let balance = client.get_account_balance().await;
//!     println!("Balance: {:.2}", balance);
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod common;
pub mod config;
pub mod error;
pub mod exchange;
pub mod monitor;

pub use alerts::{AlertSink, LogOnlyAlerter, TelegramAlerter};
pub use config::MonitorConfig;
pub use error::{AlertError, ConfigError, ExchangeError, ExchangeResult};
pub use exchange::{ExchangeApi, ExchangeClient, VenueKind};
pub use monitor::{HealthMonitor, HealthState};
