//! Minimum-spacing rate limiter
//!
//! Every request made by a client passes through one shared limiter, which
//! guarantees at least `min_interval` between consecutive dispatches.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Minimum spacing between two requests
    pub min_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
        }
    }
}

impl RateLimiterConfig {
    /// Set the minimum spacing between requests
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

/// Rate limiter enforcing a floor on inter-request spacing
///
/// Clones share state, so all holders serialize through the same timestamp.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use survivor_bot::common::{RateLimiter, RateLimiterConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = RateLimiterConfig::default().with_min_interval(Duration::from_millis(50));
///     let limiter = RateLimiter::new(config);
///
///     limiter.wait_if_needed().await;
///     // Make API request...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    last_request: Arc<Mutex<Option<Instant>>>,
    min_interval: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            last_request: Arc::new(Mutex::new(None)),
            min_interval: config.min_interval,
        }
    }

    /// Create a rate limiter with default configuration (100ms spacing)
    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Wait until `min_interval` has passed since the previous request,
    /// then record now as the latest request time.
    ///
    /// The lock is held across the wait so concurrent callers queue up
    /// rather than all waking at the same instant.
    pub async fn wait_if_needed(&self) {
        let mut last_request = self.last_request.lock().await;

        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::trace!("Rate limiter waiting {}ms", wait.as_millis());
                sleep(wait).await;
            }
        }

        let now = Instant::now();
        // Instant is monotonic, but keep the invariant explicit.
        *last_request = Some(match *last_request {
            Some(last) if last > now => last,
            _ => now,
        });
    }

    /// Configured minimum spacing
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time of the most recent request, if any
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }
}
