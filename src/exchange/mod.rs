//! Authenticated exchange REST client
//!
//! # Features
//!
//! - **Request Signing**: KuCoin V2 (signed passphrase) and Binance (query HMAC)
//! - **Rate Limiting**: minimum spacing between every request
//! - **Retry with Backoff**: `Retry-After` for 429, exponential for other statuses
//! - **Sanitized Results**: implausible values become sentinels, never errors
//!
//! # Modules
//!
//! - [`auth`]: Credentials, nonces and HMAC-SHA256 signing
//! - [`venue`]: The per-exchange strategy trait
//! - [`kucoin`], [`binance`]: Venue implementations
//! - [`transport`]: Single-attempt HTTP and the retry loop
//! - [`client`]: The [`ExchangeApi`] implementation
//! - [`types`]: Request and response types

pub mod auth;
pub mod binance;
pub mod client;
pub mod kucoin;
pub mod transport;
pub mod types;
pub mod venue;

pub use auth::{AuthHeaders, Credentials, NonceClock};
pub use client::{ClientConfig, ExchangeApi, ExchangeClient};
pub use transport::{AttemptOutcome, HttpTransport, ReqwestTransport, RetryPolicy, RetryingTransport};
pub use types::{
    Candle, Method, OrderId, OrderRequest, OrderSide, OrderType, PreparedRequest, RequestSpec,
    Ticker,
};
pub use venue::{Venue, VenueKind};

