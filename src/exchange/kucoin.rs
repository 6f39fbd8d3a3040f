//! KuCoin spot REST API
//!
//! Responses are wrapped as `{"code": "200000", "data": ...}`; any other code
//! is an application-level rejection even when the HTTP status is 200.

use serde_json::{json, Value};

use super::auth::{sign, Credentials};
use super::types::{
    parse_number, KlineLayout, OrderId, OrderRequest, PreparedRequest, RequestSpec, Ticker,
};
use super::venue::{build_url, field, Venue};
use crate::error::{ExchangeError, ExchangeResult};

/// Base URL for KuCoin API
pub const API_BASE_URL: &str = "https://api.kucoin.com";

/// Envelope code for a successful call
const SUCCESS_CODE: &str = "200000";

const ACCOUNTS_PATH: &str = "/api/v1/accounts";
const TICKER_PATH: &str = "/api/v1/market/orderbook/level1";
const CANDLES_PATH: &str = "/api/v1/market/candles";
const ORDERS_PATH: &str = "/api/v1/orders";

/// Map a common timeframe ("1h") to KuCoin notation ("1hour").
/// Already-native names pass through.
pub fn to_kucoin_interval(timeframe: &str) -> Option<&'static str> {
    match timeframe {
        "1m" | "1min" => Some("1min"),
        "3m" | "3min" => Some("3min"),
        "5m" | "5min" => Some("5min"),
        "15m" | "15min" => Some("15min"),
        "30m" | "30min" => Some("30min"),
        "1h" | "1hour" => Some("1hour"),
        "2h" | "2hour" => Some("2hour"),
        "4h" | "4hour" => Some("4hour"),
        "6h" | "6hour" => Some("6hour"),
        "8h" | "8hour" => Some("8hour"),
        "12h" | "12hour" => Some("12hour"),
        "1d" | "1day" => Some("1day"),
        "1w" | "1week" => Some("1week"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct KuCoin {
    base_url: String,
}

impl Default for KuCoin {
    fn default() -> Self {
        Self::new()
    }
}

impl KuCoin {
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Unwrap the `data` member after checking the envelope code
    fn data<'a>(&self, body: &'a Value) -> ExchangeResult<&'a Value> {
        if let Some(code) = body.get("code") {
            let code = code
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| code.to_string());
            if code != SUCCESS_CODE {
                let msg = body.get("msg").and_then(Value::as_str).unwrap_or_default();
                return Err(ExchangeError::Shape(format!("code {}: {}", code, msg)));
            }
        }
        field(body, "data")
    }
}

impl Venue for KuCoin {
    fn name(&self) -> &'static str {
        "kucoin"
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
        let (url, query) = build_url(&self.base_url, &spec.path, &spec.query_params)?;
        let body = spec.body.as_ref().map(serde_json::to_string).transpose()?;

        let headers = sign(
            credentials,
            spec.method,
            &spec.path,
            &query,
            body.as_deref().unwrap_or_default(),
            nonce,
        );

        Ok(PreparedRequest {
            method: spec.method,
            url: url.to_string(),
            headers: headers.into_header_pairs(),
            body,
        })
    }

    fn balance_request(&self) -> RequestSpec {
        RequestSpec::get(ACCOUNTS_PATH)
    }

    fn extract_balance(&self, body: &Value) -> ExchangeResult<Option<f64>> {
        let accounts = self
            .data(body)?
            .as_array()
            .ok_or_else(|| ExchangeError::Shape("accounts 'data' is not a list".to_string()))?;

        let trade_usdt = accounts.iter().find(|account| {
            account.get("type").and_then(Value::as_str) == Some("trade")
                && account.get("currency").and_then(Value::as_str) == Some("USDT")
        });

        match trade_usdt {
            Some(account) => {
                let balance = parse_number(field(account, "balance")?).ok_or_else(|| {
                    ExchangeError::Shape(format!("unparseable balance: {}", account["balance"]))
                })?;
                Ok(Some(balance))
            }
            None => Ok(None),
        }
    }

    fn ticker_request(&self, symbol: &str) -> RequestSpec {
        RequestSpec::get(TICKER_PATH).with_param("symbol", symbol)
    }

    fn extract_ticker(&self, body: &Value, _now_millis: i64) -> ExchangeResult<Ticker> {
        let data = self.data(body)?;
        if data.is_null() {
            return Err(ExchangeError::Shape("ticker 'data' is null".to_string()));
        }

        let price = parse_number(field(data, "price")?)
            .ok_or_else(|| ExchangeError::Shape(format!("unparseable price: {}", data["price"])))?;
        let timestamp = data.get("time").and_then(parse_number).unwrap_or(0.0) as i64;

        Ok(Ticker { price, timestamp })
    }

    fn klines_request(&self, symbol: &str, interval: &str, _limit: u32) -> Option<RequestSpec> {
        let interval = to_kucoin_interval(interval)?;
        Some(
            RequestSpec::get(CANDLES_PATH)
                .with_param("type", interval)
                .with_param("symbol", symbol),
        )
    }

    fn extract_klines(&self, body: &Value) -> ExchangeResult<Vec<Value>> {
        self.data(body)?
            .as_array()
            .cloned()
            .ok_or_else(|| ExchangeError::Shape("candles 'data' is not a list".to_string()))
    }

    fn kline_layout(&self) -> KlineLayout {
        // [time, open, close, high, low, volume, turnover]
        KlineLayout {
            time: 0,
            open: 1,
            close: 2,
            high: 3,
            low: 4,
            volume: 5,
            time_in_seconds: true,
        }
    }

    fn supports_kline_limit(&self) -> bool {
        false
    }

    fn order_request(&self, order: &OrderRequest) -> RequestSpec {
        let mut body = serde_json::Map::new();
        body.insert("clientOid".to_string(), json!(order.client_order_id));
        body.insert("side".to_string(), json!(order.side.to_string()));
        body.insert("symbol".to_string(), json!(order.symbol));
        body.insert("type".to_string(), json!(order.order_type().to_string()));
        body.insert("size".to_string(), json!(order.size));
        if let Some(price) = &order.price {
            body.insert("price".to_string(), json!(price));
        }

        RequestSpec::post(ORDERS_PATH).with_body(body)
    }

    fn extract_order_id(&self, body: &Value) -> ExchangeResult<OrderId> {
        let order_id = field(self.data(body)?, "orderId")?;
        match order_id {
            Value::String(id) if !id.is_empty() => Ok(OrderId(id.clone())),
            other => Err(ExchangeError::Shape(format!("bad orderId: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::types::{Method, OrderSide};

    fn creds() -> Credentials {
        Credentials::new("test_key", "test_secret", "test_passphrase", "t", "c")
    }

    #[test]
    fn test_interval_mapping() {
        assert_eq!(to_kucoin_interval("1h"), Some("1hour"));
        assert_eq!(to_kucoin_interval("1d"), Some("1day"));
        assert_eq!(to_kucoin_interval("15min"), Some("15min"));
        assert_eq!(to_kucoin_interval("7h"), None);
    }

    #[test]
    fn test_authorize_get_matches_signing_vector() {
        let venue = KuCoin::new();
        let req = venue
            .authorize(&creds(), &venue.balance_request(), 1_700_000_000_000)
            .unwrap();

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "https://api.kucoin.com/api/v1/accounts");
        assert_eq!(
            req.header("KC-API-SIGN"),
            Some("P9zn1mUFkb50PMc11DN/QKa6BadlLmRrgZoN5FZESyI=")
        );
        assert_eq!(req.header("KC-API-TIMESTAMP"), Some("1700000000000"));
        assert_eq!(req.header("KC-API-KEY-VERSION"), Some("2"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert!(req.body.is_none());
    }

    #[test]
    fn test_authorize_signs_query_string() {
        let venue = KuCoin::new();
        let spec = venue.klines_request("BTC-USDT", "1h", 100).unwrap();
        let req = venue.authorize(&creds(), &spec, 1_700_000_000_000).unwrap();

        assert!(req.url.ends_with("?type=1hour&symbol=BTC-USDT"));
        assert_eq!(
            req.header("KC-API-SIGN"),
            Some("+K27umFbihTVKgljSzDcbzGBL6YqoR5XXdMKZmXkujI=")
        );
    }

    #[test]
    fn test_authorize_post_sends_signed_body() {
        let venue = KuCoin::new();
        let order = OrderRequest {
            symbol: "BTC-USDT".to_string(),
            side: OrderSide::Buy,
            size: "0.001".to_string(),
            price: None,
            client_order_id: "1700000000000".to_string(),
        };
        let req = venue
            .authorize(&creds(), &venue.order_request(&order), 1_700_000_000_001)
            .unwrap();

        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["type"], "market");
        assert_eq!(body["side"], "buy");
        assert_eq!(body["clientOid"], "1700000000000");
        assert!(body.get("price").is_none());

        let expected = sign(
            &creds(),
            Method::Post,
            "/api/v1/orders",
            "",
            req.body.as_deref().unwrap(),
            1_700_000_000_001,
        );
        assert_eq!(req.header("KC-API-SIGN"), Some(expected.signature.as_str()));
    }

    #[test]
    fn test_limit_order_body_has_price() {
        let venue = KuCoin::new();
        let order = OrderRequest {
            symbol: "BTC-USDT".to_string(),
            side: OrderSide::Sell,
            size: "0.5".to_string(),
            price: Some("30000".to_string()),
            client_order_id: "1".to_string(),
        };
        let body = venue.order_request(&order).body.unwrap();
        assert_eq!(body["type"], "limit");
        assert_eq!(body["price"], "30000");
    }

    #[test]
    fn test_extract_balance_picks_trade_usdt() {
        let body = json!({
            "code": "200000",
            "data": [
                {"type": "main", "currency": "USDT", "balance": "999"},
                {"type": "trade", "currency": "BTC", "balance": "1"},
                {"type": "trade", "currency": "USDT", "balance": "152.30"}
            ]
        });
        assert_eq!(KuCoin::new().extract_balance(&body).unwrap(), Some(152.30));
    }

    #[test]
    fn test_extract_balance_no_account() {
        let body = json!({"code": "200000", "data": [{"type": "main", "currency": "USDT", "balance": "5"}]});
        assert_eq!(KuCoin::new().extract_balance(&body).unwrap(), None);
    }

    #[test]
    fn test_extract_balance_rejects_error_code() {
        let body = json!({"code": "400003", "msg": "KC-API-KEY not exists"});
        let err = KuCoin::new().extract_balance(&body).unwrap_err();
        assert!(err.to_string().contains("400003"));
    }

    #[test]
    fn test_extract_balance_unparseable() {
        let body = json!({"data": [{"type": "trade", "currency": "USDT", "balance": "lots"}]});
        assert!(KuCoin::new().extract_balance(&body).is_err());
    }

    #[test]
    fn test_extract_ticker() {
        let body = json!({"code": "200000", "data": {"price": "43250.5", "time": 1700000000123i64}});
        let ticker = KuCoin::new().extract_ticker(&body, 0).unwrap();
        assert_eq!(ticker.price, 43250.5);
        assert_eq!(ticker.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn test_extract_ticker_null_data() {
        let body = json!({"code": "200000", "data": null});
        assert!(KuCoin::new().extract_ticker(&body, 0).is_err());
    }

    #[test]
    fn test_extract_order_id() {
        let body = json!({"code": "200000", "data": {"orderId": "5bd6e9286d99522a52e458de"}});
        assert_eq!(
            KuCoin::new().extract_order_id(&body).unwrap(),
            OrderId("5bd6e9286d99522a52e458de".to_string())
        );
    }

    #[test]
    fn test_unknown_interval_has_no_request() {
        assert!(KuCoin::new().klines_request("BTC-USDT", "7h", 10).is_none());
    }
}
