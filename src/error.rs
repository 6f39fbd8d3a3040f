//! Error types for the exchange client, configuration and alerting

use thiserror::Error;

/// Failures inside the exchange client.
///
/// These never cross the public [`ExchangeApi`](crate::exchange::ExchangeApi)
/// boundary: every operation logs them and returns its sentinel instead.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("request failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected response shape: {0}")]
    Shape(String),

    #[error("value rejected: {0}")]
    Rejected(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Startup configuration errors. Missing credentials are fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Alert delivery errors. Callers log and drop these.
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("alert request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("alert endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
}
