//! Exchange API Client
//!
//! Composes a [`Venue`], request signing, the rate limiter and the retrying
//! transport into the [`ExchangeApi`] operations. Every operation validates
//! what the exchange returned and degrades to a sentinel instead of failing:
//!
//! - balance: `0.0`
//! - ticker: `None`
//! - klines: empty
//! - order: `None`
//!
//! # Example
//!
//! ```no_run
//! use survivor_bot::exchange::{ClientConfig, Credentials, ExchangeApi, ExchangeClient, VenueKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::new("key", "secret", "passphrase", "token", "chat");
//!     let client = ExchangeClient::new(VenueKind::Kucoin.build(None), credentials, ClientConfig::default())?;
//!
//!     let balance = client.get_account_balance().await;
//!     println!("USDT: {:.2}", balance);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::auth::{Credentials, NonceClock};
use super::transport::{HttpTransport, ReqwestTransport, RetryPolicy, RetryingTransport};
use super::types::{Candle, OrderId, OrderRequest, OrderSide, RequestSpec, Ticker};
use super::venue::Venue;
use crate::common::RateLimiterConfig;
use crate::error::{ExchangeError, ExchangeResult};

/// Balances above this are treated as corrupt data
pub const MAX_PLAUSIBLE_BALANCE: f64 = 1_000_000.0;

/// Prices above this are treated as exchange glitches
pub const MAX_PLAUSIBLE_PRICE: f64 = 1_000_000.0;

/// Operations offered by an exchange client.
///
/// None of these fail: expected failure modes come back as sentinels.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// USDT balance of the trade account; `0.0` when unavailable
    async fn get_account_balance(&self) -> f64;

    /// Current price; `None` when missing or implausible
    async fn get_ticker(&self, symbol: &str) -> Option<Ticker>;

    /// Candles in exchange order with corrupt rows removed
    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Vec<Candle>;

    /// Market order when `price` is `None`, limit order otherwise
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: &str,
        price: Option<&str>,
    ) -> Option<OrderId>;
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Rate limiter configuration
    pub rate_limiter: RateLimiterConfig,
    /// Retry and backoff configuration
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Set maximum attempts per call
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.retry = self.retry.with_max_retries(retries);
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set minimum spacing between requests
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.rate_limiter = self.rate_limiter.with_min_interval(interval);
        self
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// `Some(balance)` when `0 <= balance <= MAX_PLAUSIBLE_BALANCE`
pub fn plausible_balance(balance: f64) -> Option<f64> {
    (balance.is_finite() && (0.0..=MAX_PLAUSIBLE_BALANCE).contains(&balance)).then_some(balance)
}

/// `true` when `0 < price <= MAX_PLAUSIBLE_PRICE`
pub fn plausible_price(price: f64) -> bool {
    price.is_finite() && price > 0.0 && price <= MAX_PLAUSIBLE_PRICE
}

/// `true` when the candle has a positive close and non-negative volume
pub fn plausible_candle(candle: &Candle) -> bool {
    candle.close > 0.0 && candle.volume >= 0.0
}

/// Finite, strictly positive decimal such as an order size or price
fn parse_positive(label: &str, value: &str) -> ExchangeResult<()> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(()),
        _ => Err(ExchangeError::Rejected(format!("{} '{}' is not a positive number", label, value))),
    }
}

/// Signed REST client for one venue
pub struct ExchangeClient<T = ReqwestTransport> {
    venue: Arc<dyn Venue>,
    credentials: Arc<Credentials>,
    transport: RetryingTransport<T>,
    nonce: NonceClock,
}

impl ExchangeClient<ReqwestTransport> {
    /// Create a client that talks HTTP through `reqwest`
    pub fn new(
        venue: Arc<dyn Venue>,
        credentials: Credentials,
        config: ClientConfig,
    ) -> ExchangeResult<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_transport(venue, credentials, transport, config))
    }
}

impl<T: HttpTransport> ExchangeClient<T> {
    /// Create a client on top of any transport
    pub fn with_transport(
        venue: Arc<dyn Venue>,
        credentials: Credentials,
        transport: T,
        config: ClientConfig,
    ) -> Self {
        Self {
            venue,
            credentials: Arc::new(credentials),
            transport: RetryingTransport::new(transport, config.rate_limiter, config.retry),
            nonce: NonceClock::new(),
        }
    }

    pub fn venue(&self) -> &dyn Venue {
        self.venue.as_ref()
    }

    pub fn transport(&self) -> &RetryingTransport<T> {
        &self.transport
    }

    /// Sign and send `spec` through the retry loop
    async fn call(&self, label: &str, spec: RequestSpec) -> ExchangeResult<Value> {
        let span = info_span!("exchange", venue = self.venue.name(), op = label);
        let prepare = || {
            self.venue
                .authorize(&self.credentials, &spec, self.nonce.next())
        };
        self.transport.execute(label, prepare).instrument(span).await
    }

    async fn fetch_balance(&self) -> ExchangeResult<f64> {
        let body = self.call("balance", self.venue.balance_request()).await?;
        debug!("Raw balance response: {}", truncated_json(&body));

        match self.venue.extract_balance(&body)? {
            Some(balance) => plausible_balance(balance).ok_or_else(|| {
                ExchangeError::Rejected(format!("suspicious balance value: ${}", balance))
            }),
            None => {
                warn!("No USDT trade account found");
                Ok(0.0)
            }
        }
    }

    async fn fetch_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let body = self.call("ticker", self.venue.ticker_request(symbol)).await?;
        let now = chrono::Utc::now().timestamp_millis();
        let ticker = self.venue.extract_ticker(&body, now)?;

        if !plausible_price(ticker.price) {
            return Err(ExchangeError::Rejected(format!(
                "invalid price for {}: ${}",
                symbol, ticker.price
            )));
        }
        Ok(ticker)
    }

    async fn fetch_klines(&self, symbol: &str, interval: &str, limit: u32) -> ExchangeResult<Vec<Candle>> {
        let spec = self
            .venue
            .klines_request(symbol, interval, limit)
            .ok_or_else(|| {
                ExchangeError::InvalidRequest(format!(
                    "interval '{}' not supported by {}",
                    interval,
                    self.venue.name()
                ))
            })?;

        let body = self.call("klines", spec).await?;
        let mut rows = self.venue.extract_klines(&body)?;
        if !self.venue.supports_kline_limit() {
            rows.truncate(limit as usize);
        }

        let layout = self.venue.kline_layout();
        let total = rows.len();
        let candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| layout.parse_row(row))
            .filter(plausible_candle)
            .collect();

        if candles.len() < total {
            warn!(
                "Discarded {} of {} candles for {} as malformed",
                total - candles.len(),
                total,
                symbol
            );
        }
        Ok(candles)
    }

    async fn submit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: &str,
        price: Option<&str>,
    ) -> ExchangeResult<OrderId> {
        parse_positive("size", size)?;
        if let Some(price) = price {
            parse_positive("price", price)?;
        }

        let order = OrderRequest {
            symbol: symbol.to_string(),
            side,
            size: size.trim().to_string(),
            price: price.map(|p| p.trim().to_string()),
            client_order_id: self.nonce.next().to_string(),
        };
        info!(
            "Placing {} {} order: {} {} @ {}",
            order.order_type(),
            order.side,
            order.size,
            order.symbol,
            order.price.as_deref().unwrap_or("market")
        );

        let body = self.call("order", self.venue.order_request(&order)).await?;
        self.venue.extract_order_id(&body)
    }
}

#[async_trait]
impl<T: HttpTransport> ExchangeApi for ExchangeClient<T> {
    async fn get_account_balance(&self) -> f64 {
        match self.fetch_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                error!("Error getting balance: {}", e);
                0.0
            }
        }
    }

    async fn get_ticker(&self, symbol: &str) -> Option<Ticker> {
        match self.fetch_ticker(symbol).await {
            Ok(ticker) => Some(ticker),
            Err(e) => {
                error!("Error getting ticker for {}: {}", symbol, e);
                None
            }
        }
    }

    async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> Vec<Candle> {
        match self.fetch_klines(symbol, interval, limit).await {
            Ok(candles) => candles,
            Err(e) => {
                error!("Error getting klines for {}: {}", symbol, e);
                Vec::new()
            }
        }
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: &str,
        price: Option<&str>,
    ) -> Option<OrderId> {
        match self.submit_order(symbol, side, size, price).await {
            Ok(order_id) => {
                info!("Order placed on {}: {}", symbol, order_id);
                Some(order_id)
            }
            Err(e) => {
                error!("Order placement failed for {}: {}", symbol, e);
                None
            }
        }
    }
}

fn truncated_json(value: &Value) -> String {
    let rendered = value.to_string();
    rendered.chars().take(200).collect()
}
