//! HTTP transport with retry and backoff
//!
//! [`HttpTransport`] sends one request and classifies what came back.
//! [`RetryingTransport`] drives the attempt loop on top of it:
//!
//! | outcome                          | delay before next attempt      |
//! |----------------------------------|--------------------------------|
//! | 200 with JSON body               | none, success                  |
//! | 429                              | `Retry-After` (default 60s)    |
//! | any other status                 | `2^attempt` seconds            |
//! | timeout / transport / bad JSON   | fixed transient delay (2s)     |
//!
//! Every failed attempt counts towards `max_retries`, 429 included.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::{Method, PreparedRequest};
use crate::common::{RateLimiter, RateLimiterConfig};
use crate::error::{ExchangeError, ExchangeResult};

/// Characters of a response body written to the log per attempt
const LOGGED_BODY_CHARS: usize = 200;

/// Result of a single HTTP attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// HTTP 200 with the raw body
    Success(String),
    /// HTTP 429, with the `Retry-After` hint in seconds if one was sent
    RateLimited(Option<u64>),
    /// Any status other than 200 and 429
    ServerError { status: u16, body: String },
    Timeout,
    TransportError(String),
}

/// Sends one prepared request
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> AttemptOutcome;
}

/// Production transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> ExchangeResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ExchangeError::InvalidRequest(format!("HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &PreparedRequest) -> AttemptOutcome {
        let mut builder = match request.method {
            Method::Get => self.http_client.get(&request.url),
            Method::Post => self.http_client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return AttemptOutcome::Timeout,
            Err(e) => return AttemptOutcome::TransportError(e.without_url().to_string()),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return AttemptOutcome::RateLimited(retry_after);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return AttemptOutcome::Timeout,
            Err(e) => return AttemptOutcome::TransportError(e.without_url().to_string()),
        };

        if status == StatusCode::OK {
            AttemptOutcome::Success(body)
        } else {
            AttemptOutcome::ServerError {
                status: status.as_u16(),
                body,
            }
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per logical call
    pub max_retries: u32,
    /// Delay after a timeout or transport error
    pub transient_delay: Duration,
    /// Delay after a 429 without a `Retry-After` header
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            transient_delay: Duration::from_secs(2),
            default_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_transient_delay(mut self, delay: Duration) -> Self {
        self.transient_delay = delay;
        self
    }

    pub fn with_default_retry_after(mut self, delay: Duration) -> Self {
        self.default_retry_after = delay;
        self
    }

    /// Exponential backoff for non-200 statuses: 1s, 2s, 4s, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }

    /// How long to wait after `outcome` on attempt `attempt` (0-based).
    /// `None` means the attempt succeeded.
    pub fn delay_for(&self, outcome: &AttemptOutcome, attempt: u32) -> Option<Duration> {
        match outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::RateLimited(hint) => Some(
                hint.map(Duration::from_secs)
                    .unwrap_or(self.default_retry_after),
            ),
            AttemptOutcome::ServerError { .. } => Some(self.backoff(attempt)),
            AttemptOutcome::Timeout | AttemptOutcome::TransportError(_) => {
                Some(self.transient_delay)
            }
        }
    }
}

/// Runs the attempt loop: rate limit, sign, send, classify, back off.
#[derive(Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    rate_limiter: RateLimiter,
    policy: RetryPolicy,
}

impl<T: HttpTransport> RetryingTransport<T> {
    pub fn new(inner: T, rate_limiter: RateLimiterConfig, policy: RetryPolicy) -> Self {
        Self {
            inner,
            rate_limiter: RateLimiter::new(rate_limiter),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Execute one logical call.
    ///
    /// `prepare` is invoked once per attempt so every attempt carries a fresh
    /// nonce. A `prepare` error aborts immediately; it cannot be fixed by
    /// retrying.
    pub async fn execute<F>(&self, label: &str, prepare: F) -> ExchangeResult<Value>
    where
        F: Fn() -> ExchangeResult<PreparedRequest> + Send + Sync,
    {
        let mut last = String::from("no attempts made");

        for attempt in 0..self.policy.max_retries {
            self.rate_limiter.wait_if_needed().await;

            let request = prepare()?;
            let outcome = self.inner.send(&request).await;
            let outcome = match outcome {
                AttemptOutcome::Success(body) => {
                    debug!(
                        "{} attempt {}/{}: 200 {}",
                        label,
                        attempt + 1,
                        self.policy.max_retries,
                        truncate(&body)
                    );
                    match serde_json::from_str::<Value>(&body) {
                        Ok(value) => return Ok(value),
                        Err(e) => AttemptOutcome::TransportError(format!(
                            "unparseable response body: {}",
                            e
                        )),
                    }
                }
                other => other,
            };

            let delay = self
                .policy
                .delay_for(&outcome, attempt)
                .unwrap_or(self.policy.transient_delay);
            last = describe(&outcome);
            self.log_failure(label, attempt, &outcome, delay);

            sleep(delay).await;
        }

        error!(
            "{} failed to complete after {} attempts: {}",
            label, self.policy.max_retries, last
        );
        Err(ExchangeError::Exhausted {
            attempts: self.policy.max_retries,
            last,
        })
    }

    fn log_failure(&self, label: &str, attempt: u32, outcome: &AttemptOutcome, delay: Duration) {
        let n = attempt + 1;
        let max = self.policy.max_retries;
        match outcome {
            AttemptOutcome::RateLimited(_) => {
                warn!(
                    "{} rate limited (attempt {}/{}), waiting {}s",
                    label,
                    n,
                    max,
                    delay.as_secs()
                );
            }
            AttemptOutcome::ServerError { status, body } => {
                error!(
                    "{} API error {} (attempt {}/{}): {}",
                    label,
                    status,
                    n,
                    max,
                    truncate(body)
                );
                info!("{} retrying in {}s", label, delay.as_secs());
            }
            AttemptOutcome::Timeout => {
                warn!("{} request timeout (attempt {}/{})", label, n, max);
            }
            AttemptOutcome::TransportError(msg) => {
                error!("{} request failed (attempt {}/{}): {}", label, n, max, msg);
            }
            AttemptOutcome::Success(_) => {}
        }
    }
}

fn describe(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Success(_) => "success".to_string(),
        AttemptOutcome::RateLimited(_) => "rate limited".to_string(),
        AttemptOutcome::ServerError { status, body } => {
            format!("HTTP {}: {}", status, truncate(body))
        }
        AttemptOutcome::Timeout => "timeout".to_string(),
        AttemptOutcome::TransportError(msg) => msg.clone(),
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(LOGGED_BODY_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each send happened
    struct Scripted {
        outcomes: Mutex<VecDeque<AttemptOutcome>>,
        fallback: AttemptOutcome,
        sent_at: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<AttemptOutcome>, fallback: AttemptOutcome) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                fallback,
                sent_at: Mutex::new(Vec::new()),
            }
        }

        fn sends(&self) -> Vec<Instant> {
            self.sent_at.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(&self, _request: &PreparedRequest) -> AttemptOutcome {
            self.sent_at.lock().unwrap().push(Instant::now());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn request() -> ExchangeResult<PreparedRequest> {
        Ok(PreparedRequest {
            method: Method::Get,
            url: "http://localhost/test".to_string(),
            headers: Vec::new(),
            body: None,
        })
    }

    fn transport(script: Scripted) -> RetryingTransport<Scripted> {
        RetryingTransport::new(script, RateLimiterConfig::default(), RetryPolicy::default())
    }

    fn server_error() -> AttemptOutcome {
        AttemptOutcome::ServerError {
            status: 500,
            body: "boom".to_string(),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.transient_delay, Duration::from_secs(2));
        assert_eq!(policy.default_retry_after, Duration::from_secs(60));
    }

    #[test]
    fn test_delay_for_each_outcome() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(&AttemptOutcome::Success("{}".into()), 0), None);
        assert_eq!(
            policy.delay_for(&AttemptOutcome::RateLimited(Some(7)), 0),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            policy.delay_for(&AttemptOutcome::RateLimited(None), 0),
            Some(Duration::from_secs(60))
        );
        assert_eq!(policy.delay_for(&server_error(), 0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(&server_error(), 1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(&server_error(), 2), Some(Duration::from_secs(4)));
        assert_eq!(
            policy.delay_for(&AttemptOutcome::Timeout, 2),
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let t = transport(Scripted::new(
            vec![AttemptOutcome::Success(r#"{"ok":true}"#.to_string())],
            server_error(),
        ));
        let start = Instant::now();

        let value = t.execute("test", request).await.unwrap();

        assert_eq!(value["ok"], true);
        assert_eq!(t.inner().sends().len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_500_exhausts_with_exponential_backoff() {
        let t = transport(Scripted::new(vec![], server_error()));
        let start = Instant::now();

        let err = t.execute("test", request).await.unwrap_err();

        let sends = t.inner().sends();
        assert_eq!(sends.len(), 3);
        assert_eq!(sends[1] - sends[0], Duration::from_secs(1));
        assert_eq!(sends[2] - sends[1], Duration::from_secs(2));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert!(matches!(err, ExchangeError::Exhausted { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let t = transport(Scripted::new(
            vec![
                AttemptOutcome::Timeout,
                AttemptOutcome::TransportError("connection reset".to_string()),
                AttemptOutcome::Success("[1,2,3]".to_string()),
            ],
            server_error(),
        ));
        let start = Instant::now();

        let value = t.execute("test", request).await.unwrap();

        assert_eq!(value, serde_json::json!([1, 2, 3]));
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honours_retry_after() {
        let t = transport(Scripted::new(
            vec![
                AttemptOutcome::RateLimited(Some(5)),
                AttemptOutcome::Success("{}".to_string()),
            ],
            server_error(),
        ));

        t.execute("test", request).await.unwrap();

        let sends = t.inner().sends();
        assert_eq!(sends[1] - sends[0], Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_defaults_to_sixty_seconds() {
        let t = transport(Scripted::new(
            vec![
                AttemptOutcome::RateLimited(None),
                AttemptOutcome::Success("{}".to_string()),
            ],
            server_error(),
        ));

        t.execute("test", request).await.unwrap();

        let sends = t.inner().sends();
        assert_eq!(sends[1] - sends[0], Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_counts_towards_max_retries() {
        let t = transport(Scripted::new(vec![], AttemptOutcome::RateLimited(Some(1))));

        let err = t.execute("test", request).await.unwrap_err();

        assert_eq!(t.inner().sends().len(), 3);
        assert!(matches!(err, ExchangeError::Exhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_body_is_retried() {
        let t = transport(Scripted::new(
            vec![
                AttemptOutcome::Success("<html>".to_string()),
                AttemptOutcome::Success("{}".to_string()),
            ],
            server_error(),
        ));

        t.execute("test", request).await.unwrap();

        let sends = t.inner().sends();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[1] - sends[0], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_error_aborts_without_sending() {
        let t = transport(Scripted::new(vec![], server_error()));

        let err = t
            .execute("test", || Err(ExchangeError::InvalidRequest("bad".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::InvalidRequest(_)));
        assert!(t.inner().sends().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prepare_called_per_attempt() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let t = transport(Scripted::new(vec![], server_error()));
        let calls = AtomicU32::new(0);

        let _ = t
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                request()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // ===== ReqwestTransport against a local socket =====

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status_line: &str, headers: &[&str], body: &str) -> String {
        let mut response = format!("HTTP/1.1 {}\r\n", status_line);
        for header in headers {
            response.push_str(header);
            response.push_str("\r\n");
        }
        response.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        response
    }

    /// Serve one connection: read the request, wait `stall`, then answer.
    async fn serve_once(response: String, stall: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(stall).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/api/v1/accounts", addr)
    }

    async fn send_to(response: String) -> AttemptOutcome {
        let url = serve_once(response, Duration::ZERO).await;
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        transport.send(&get(&url)).await
    }

    fn get(url: &str) -> PreparedRequest {
        PreparedRequest {
            method: Method::Get,
            url: url.to_string(),
            headers: vec![("KC-API-KEY".to_string(), "key".to_string())],
            body: None,
        }
    }

    #[tokio::test]
    async fn test_http_200_is_success_with_body() {
        let outcome = send_to(http_response("200 OK", &[], r#"{"code":"200000"}"#)).await;
        assert_eq!(outcome, AttemptOutcome::Success(r#"{"code":"200000"}"#.to_string()));
    }

    #[tokio::test]
    async fn test_http_429_reads_numeric_retry_after() {
        let outcome =
            send_to(http_response("429 Too Many Requests", &["Retry-After: 7"], "")).await;
        assert_eq!(outcome, AttemptOutcome::RateLimited(Some(7)));
    }

    #[tokio::test]
    async fn test_http_429_without_retry_after() {
        let outcome = send_to(http_response("429 Too Many Requests", &[], "slow down")).await;
        assert_eq!(outcome, AttemptOutcome::RateLimited(None));
    }

    #[tokio::test]
    async fn test_http_429_with_date_retry_after_is_ignored() {
        let outcome = send_to(http_response(
            "429 Too Many Requests",
            &["Retry-After: Wed, 21 Oct 2015 07:28:00 GMT"],
            "",
        ))
        .await;
        assert_eq!(outcome, AttemptOutcome::RateLimited(None));
    }

    #[tokio::test]
    async fn test_other_status_is_server_error_with_body() {
        let outcome = send_to(http_response("503 Service Unavailable", &[], "maintenance")).await;
        assert_eq!(
            outcome,
            AttemptOutcome::ServerError {
                status: 503,
                body: "maintenance".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_non_200_success_status_is_server_error() {
        let outcome = send_to(http_response("201 Created", &[], "{}")).await;
        assert!(matches!(outcome, AttemptOutcome::ServerError { status: 201, .. }));
    }

    #[tokio::test]
    async fn test_stalled_server_is_timeout() {
        let url = serve_once(
            http_response("200 OK", &[], "{}"),
            Duration::from_secs(10),
        )
        .await;
        let transport = ReqwestTransport::new(Duration::from_millis(200)).unwrap();

        assert_eq!(transport.send(&get(&url)).await, AttemptOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error_without_url() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{}/api/v3/account?signature=deadbeef", addr);
        let transport = ReqwestTransport::new(Duration::from_secs(2)).unwrap();

        match transport.send(&get(&url)).await {
            AttemptOutcome::TransportError(msg) => assert!(!msg.contains("deadbeef")),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), LOGGED_BODY_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}
