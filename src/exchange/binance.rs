//! Binance spot REST API
//!
//! Signed endpoints carry `timestamp` and a trailing `signature` query
//! parameter; the API key travels in the `X-MBX-APIKEY` header.

use serde_json::Value;

use super::auth::{sign_query, Credentials};
use super::types::{
    parse_number, KlineLayout, OrderId, OrderRequest, OrderSide, OrderType, PreparedRequest,
    RequestSpec, Ticker,
};
use super::venue::{build_url, field, Venue};
use crate::error::{ExchangeError, ExchangeResult};

/// Base URL for Binance API
pub const API_BASE_URL: &str = "https://api.binance.com";

/// Maximum klines per request (Binance limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

const ACCOUNT_PATH: &str = "/api/v3/account";
const TICKER_PATH: &str = "/api/v3/ticker/price";
const KLINES_PATH: &str = "/api/v3/klines";
const ORDER_PATH: &str = "/api/v3/order";

const SUPPORTED_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

#[derive(Debug, Clone)]
pub struct Binance {
    base_url: String,
}

impl Default for Binance {
    fn default() -> Self {
        Self::new()
    }
}

impl Binance {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Venue for Binance {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(
        &self,
        credentials: &Credentials,
        spec: &RequestSpec,
        nonce: u64,
    ) -> ExchangeResult<PreparedRequest> {
        let mut params = spec.query_params.clone();
        params.push(("timestamp".to_string(), nonce.to_string()));

        let (mut url, query) = build_url(&self.base_url, &spec.path, &params)?;
        let signature = sign_query(&query, credentials.api_secret());
        url.query_pairs_mut().append_pair("signature", &signature);

        Ok(PreparedRequest {
            method: spec.method,
            url: url.to_string(),
            headers: vec![
                ("X-MBX-APIKEY".to_string(), credentials.api_key().to_string()),
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
            ],
            body: None,
        })
    }

    fn balance_request(&self) -> RequestSpec {
        RequestSpec::get(ACCOUNT_PATH)
    }

    fn extract_balance(&self, body: &Value) -> ExchangeResult<Option<f64>> {
        let balances = field(body, "balances")?
            .as_array()
            .ok_or_else(|| ExchangeError::Shape("'balances' is not a list".to_string()))?;

        match balances
            .iter()
            .find(|b| b.get("asset").and_then(Value::as_str) == Some("USDT"))
        {
            Some(balance) => {
                let free = parse_number(field(balance, "free")?).ok_or_else(|| {
                    ExchangeError::Shape(format!("unparseable free balance: {}", balance["free"]))
                })?;
                Ok(Some(free))
            }
            None => Ok(None),
        }
    }

    fn ticker_request(&self, symbol: &str) -> RequestSpec {
        RequestSpec::get(TICKER_PATH).with_param("symbol", symbol)
    }

    fn extract_ticker(&self, body: &Value, now_millis: i64) -> ExchangeResult<Ticker> {
        let price = parse_number(field(body, "price")?)
            .ok_or_else(|| ExchangeError::Shape(format!("unparseable price: {}", body["price"])))?;
        // The price endpoint carries no timestamp.
        Ok(Ticker {
            price,
            timestamp: now_millis,
        })
    }

    fn klines_request(&self, symbol: &str, interval: &str, limit: u32) -> Option<RequestSpec> {
        if !SUPPORTED_INTERVALS.contains(&interval) {
            return None;
        }
        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        Some(
            RequestSpec::get(KLINES_PATH)
                .with_param("symbol", symbol)
                .with_param("interval", interval)
                .with_param("limit", limit.to_string()),
        )
    }

    fn extract_klines(&self, body: &Value) -> ExchangeResult<Vec<Value>> {
        body.as_array()
            .cloned()
            .ok_or_else(|| ExchangeError::Shape("klines response is not a list".to_string()))
    }

    fn kline_layout(&self) -> KlineLayout {
        // [open_time, open, high, low, close, volume, close_time, ...]
        KlineLayout {
            time: 0,
            open: 1,
            high: 2,
            low: 3,
            close: 4,
            volume: 5,
            time_in_seconds: false,
        }
    }

    fn supports_kline_limit(&self) -> bool {
        true
    }

    fn order_request(&self, order: &OrderRequest) -> RequestSpec {
        let side = match order.side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match order.order_type() {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        };

        let mut spec = RequestSpec::post(ORDER_PATH)
            .with_param("symbol", order.symbol.as_str())
            .with_param("side", side)
            .with_param("type", order_type)
            .with_param("quantity", order.size.as_str());
        if let Some(price) = &order.price {
            spec = spec
                .with_param("price", price.as_str())
                .with_param("timeInForce", "GTC");
        }
        spec.with_param("newClientOrderId", order.client_order_id.as_str())
    }

    fn extract_order_id(&self, body: &Value) -> ExchangeResult<OrderId> {
        match field(body, "orderId")? {
            Value::Number(n) => Ok(OrderId(n.to_string())),
            Value::String(s) if !s.is_empty() => Ok(OrderId(s.clone())),
            other => Err(ExchangeError::Shape(format!("bad orderId: {}", other))),
        }
    }
}
