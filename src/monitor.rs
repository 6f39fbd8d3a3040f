//! Balance health monitoring
//!
//! [`HealthMonitor::check_health`] fetches the balance once and tracks how many
//! checks in a row came back empty. At the threshold it alerts, and keeps
//! alerting on every further empty check until a positive balance resets it.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::alerts::{deliver, AlertSink};
use crate::exchange::ExchangeApi;

/// Empty checks in a row before alerting
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

pub const BALANCE_WARNING: &str = "⚠️ WARNING: Cannot fetch balance!";
pub const STARTED_MESSAGE: &str = "🤖 Survivor bot started";
pub const STOPPED_MESSAGE: &str = "🛑 Survivor bot stopped";

/// Mutable health bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthState {
    pub consecutive_failures: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
}

pub struct HealthMonitor<E, A> {
    exchange: E,
    alerts: A,
    state: HealthState,
    failure_threshold: u32,
}

impl<E: ExchangeApi, A: AlertSink> HealthMonitor<E, A> {
    pub fn new(exchange: E, alerts: A) -> Self {
        Self::with_threshold(exchange, alerts, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_threshold(exchange: E, alerts: A, failure_threshold: u32) -> Self {
        Self {
            exchange,
            alerts,
            state: HealthState::default(),
            failure_threshold,
        }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn alerts(&self) -> &A {
        &self.alerts
    }

    /// Fetch the balance and update health state.
    ///
    /// `0.0` counts as a failure: it cannot be told apart from an account that
    /// really holds nothing.
    pub async fn check_health(&mut self) -> f64 {
        let balance = self.exchange.get_account_balance().await;
        self.state.last_checked_at = Some(Utc::now());

        if balance == 0.0 {
            self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
            if self.state.consecutive_failures >= self.failure_threshold {
                warn!(
                    "Balance unavailable for {} consecutive checks",
                    self.state.consecutive_failures
                );
                deliver(&self.alerts, BALANCE_WARNING).await;
            }
        } else {
            self.state.consecutive_failures = 0;
        }

        balance
    }

    /// Send a message through the alert sink, ignoring delivery failures
    pub async fn alert(&self, message: &str) {
        deliver(&self.alerts, message).await;
    }
}

/// Run health checks every `poll_interval` until `shutdown` resolves.
///
/// Sends a start alert first and a stop alert on exit. `shutdown` is only
/// observed between cycles, so a check in progress always completes.
pub async fn run<E, A, S>(monitor: &mut HealthMonitor<E, A>, poll_interval: Duration, shutdown: S)
where
    E: ExchangeApi,
    A: AlertSink,
    S: Future<Output = ()>,
{
    info!("Starting monitor loop (every {}s)", poll_interval.as_secs());
    monitor.alert(STARTED_MESSAGE).await;

    tokio::pin!(shutdown);
    loop {
        let balance = monitor.check_health().await;
        if balance > 0.0 {
            info!("✅ Balance: ${:.2}", balance);
        } else {
            warn!("⚠️ Cannot fetch balance");
        }

        tokio::select! {
            _ = sleep(poll_interval) => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Monitor stopped");
    monitor.alert(STOPPED_MESSAGE).await;
}

/// Listen for `signal` on its own task, starting now.
///
/// The returned future resolves once the signal fires. Signal futures such as
/// `tokio::signal::ctrl_c()` only install their handler when first polled, and
/// [`run`] polls `shutdown` only after the first check, so the listener must
/// not wait for the loop. If listening fails the future never resolves.
pub fn spawn_shutdown_listener<F>(signal: F) -> impl Future<Output = ()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        if let Err(e) = signal.await {
            error!("Failed to listen for shutdown signal: {}", e);
            // Holding the sender keeps the receiver pending.
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, finishing current check...");
        let _ = tx.send(());
    });

    async move {
        let _ = rx.await;
    }
}
