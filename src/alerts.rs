//! Operator alerts
//!
//! Alerts are fire-and-forget: a failed delivery is logged and never reaches
//! the monitoring loop.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::AlertError;
use crate::exchange::auth::mask;

/// Base URL for the Telegram Bot API
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Delivers a text message to an operator channel
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), AlertError>;
}

#[async_trait]
impl<T: AlertSink + ?Sized> AlertSink for Box<T> {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        (**self).notify(message).await
    }
}

/// Send `message` and swallow any failure after logging it
pub async fn deliver<A: AlertSink + ?Sized>(sink: &A, message: &str) {
    match sink.notify(message).await {
        Ok(()) => debug!("Alert delivered: {}", message),
        Err(e) => error!("Failed to send alert: {}", e),
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram bot alert sink
///
/// The bot token is part of the request URL, so transport errors are stripped
/// of their URL before they can reach a log line.
#[derive(Clone)]
pub struct TelegramAlerter {
    http_client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    pub fn new(
        token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        Self::with_api_base(TELEGRAM_API_BASE, token, chat_id, timeout)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::Http(e.without_url()))?;
        Ok(Self {
            http_client,
            api_base: api_base.into(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token
        )
    }
}

impl std::fmt::Debug for TelegramAlerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAlerter")
            .field("api_base", &self.api_base)
            .field("token", &mask(&self.token))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[async_trait]
impl AlertSink for TelegramAlerter {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        let response = self
            .http_client
            .post(self.endpoint())
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: message,
            })
            .send()
            .await
            .map_err(|e| AlertError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Sink that only logs; used when alerting is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyAlerter;

#[async_trait]
impl AlertSink for LogOnlyAlerter {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        tracing::info!("[alert] {}", message);
        Ok(())
    }
}
