//! Request and response types shared by all venues

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of a signed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request before signing.
///
/// Query parameters keep insertion order because the serialized query string
/// is part of the signed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query_params: Vec<(String, String)>,
    pub body: Option<serde_json::Map<String, Value>>,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query_params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query_params: Vec::new(),
            body: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully signed request, ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// Look up a header by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Last traded price of a symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub price: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Column positions of a raw kline row for one venue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KlineLayout {
    pub time: usize,
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: usize,
    /// Whether the time column is in seconds rather than milliseconds
    pub time_in_seconds: bool,
}

/// Minimum number of fields a raw kline row must carry
pub const MIN_KLINE_FIELDS: usize = 6;

impl KlineLayout {
    /// Parse one raw row. Returns `None` for short rows or unparseable fields;
    /// plausibility checks happen in the client.
    pub fn parse_row(&self, row: &Value) -> Option<Candle> {
        let fields = row.as_array()?;
        if fields.len() < MIN_KLINE_FIELDS {
            return None;
        }

        let raw_time = parse_number(fields.get(self.time)?)? as i64;
        let millis = if self.time_in_seconds {
            raw_time.checked_mul(1000)?
        } else {
            raw_time
        };

        Some(Candle {
            datetime: DateTime::from_timestamp_millis(millis)?,
            open: parse_number(fields.get(self.open)?)?,
            high: parse_number(fields.get(self.high)?)?,
            low: parse_number(fields.get(self.low)?)?,
            close: parse_number(fields.get(self.close)?)?,
            volume: parse_number(fields.get(self.volume)?)?,
        })
    }
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order type, derived from whether a price was given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}

/// Validated order, ready to be turned into a venue request
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: String,
    pub price: Option<String>,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn order_type(&self) -> OrderType {
        if self.price.is_some() {
            OrderType::Limit
        } else {
            OrderType::Market
        }
    }
}

/// Exchange-assigned order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read a JSON value that exchanges send either as a number or a numeric string
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
