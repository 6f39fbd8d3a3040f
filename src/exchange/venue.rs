//! Exchange-specific strategies
//!
//! A [`Venue`] knows how to sign requests for one exchange, which endpoints
//! serve each operation, and how to pull raw values out of its responses.
//! Plausibility checks are shared and live in the client.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::auth::Credentials;
use super::binance::Binance;
use super::kucoin::KuCoin;
use super::types::{KlineLayout, OrderId, OrderRequest, PreparedRequest, RequestSpec, Ticker};
use crate::error::{ExchangeError, ExchangeResult};

/// Signing scheme, endpoints and response layout of one exchange
pub trait Venue: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn base_url(&self) -> &str;

    /// Sign `spec` with the given nonce, producing the request to send
    fn authorize(
        &self,
        credentials: &Credentials,
        spec: &RequestSpec,
        nonce: u64,
    ) -> ExchangeResult<PreparedRequest>;

    fn balance_request(&self) -> RequestSpec;

    /// Raw USDT trade balance. `Ok(None)` when no matching account exists.
    fn extract_balance(&self, body: &Value) -> ExchangeResult<Option<f64>>;

    fn ticker_request(&self, symbol: &str) -> RequestSpec;

    /// Raw ticker, before price plausibility checks
    fn extract_ticker(&self, body: &Value, now_millis: i64) -> ExchangeResult<Ticker>;

    /// `None` when the interval has no equivalent on this venue
    fn klines_request(&self, symbol: &str, interval: &str, limit: u32) -> Option<RequestSpec>;

    /// Raw kline rows in exchange order
    fn extract_klines(&self, body: &Value) -> ExchangeResult<Vec<Value>>;

    fn kline_layout(&self) -> KlineLayout;

    /// Whether the venue sends a `limit` parameter; if not the client truncates
    fn supports_kline_limit(&self) -> bool;

    fn order_request(&self, order: &OrderRequest) -> RequestSpec;

    fn extract_order_id(&self, body: &Value) -> ExchangeResult<OrderId>;
}

/// Supported venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    #[default]
    Kucoin,
    Binance,
}

impl VenueKind {
    /// Build the venue, optionally against a non-default base URL
    pub fn build(self, base_url: Option<&str>) -> Arc<dyn Venue> {
        match (self, base_url) {
            (VenueKind::Kucoin, Some(url)) => Arc::new(KuCoin::with_base_url(url)),
            (VenueKind::Kucoin, None) => Arc::new(KuCoin::new()),
            (VenueKind::Binance, Some(url)) => Arc::new(Binance::with_base_url(url)),
            (VenueKind::Binance, None) => Arc::new(Binance::new()),
        }
    }

    /// Environment variable prefix for API credentials
    pub fn env_prefix(self) -> &'static str {
        match self {
            VenueKind::Kucoin => "KUCOIN",
            VenueKind::Binance => "BINANCE",
        }
    }

    /// Whether API keys for this venue carry a passphrase
    pub fn requires_passphrase(self) -> bool {
        matches!(self, VenueKind::Kucoin)
    }

    /// Fallback credentials file name
    pub fn credentials_file(self) -> &'static str {
        match self {
            VenueKind::Kucoin => "kucoin_config.json",
            VenueKind::Binance => "binance_config.json",
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueKind::Kucoin => write!(f, "kucoin"),
            VenueKind::Binance => write!(f, "binance"),
        }
    }
}

/// Join base URL, path and query params.
///
/// Returns the URL and its serialized query string, which is exactly what
/// goes on the wire and therefore what must be signed.
pub(crate) fn build_url(
    base_url: &str,
    path: &str,
    params: &[(String, String)],
) -> ExchangeResult<(Url, String)> {
    let mut url = Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), path))
        .map_err(|e| ExchangeError::InvalidRequest(format!("bad URL for {}: {}", path, e)))?;

    if !params.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let query = url.query().unwrap_or_default().to_string();
    Ok((url, query))
}

/// Field of a JSON object, or a shape error naming it
pub(crate) fn field<'a>(value: &'a Value, name: &str) -> ExchangeResult<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| ExchangeError::Shape(format!("missing field '{}'", name)))
}
