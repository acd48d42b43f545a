//! One price-alert monitoring cycle.
//!
//! Each cycle:
//! 1. loads every active alert
//! 2. fetches current prices for the distinct tickers in one batched call
//! 3. evaluates each alert whose ticker was priced
//! 4. notifies every registered device of each triggering alert's owner
//! 5. deactivates all triggered alerts in a single store transaction
//!
//! Alerts whose ticker was not priced stay active for the next cycle.
//! Notifications already sent are not retracted if step 5 fails.

use async_trait::async_trait;
use futures::future::join_all;
use microcap_common::logging::generate_trace_id;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};

use super::store::AlertStore;
use super::PriceAlert;
use crate::data::MarketDataPort;
use crate::notification::NotificationSink;
use crate::scheduler::ScheduledJob;

// ============================================================================
// Outcome
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Alerts were evaluated and transitions (if any) persisted
    Completed,
    /// Nothing to evaluate
    NoActiveAlerts,
    /// Another cycle was already running
    Skipped,
    /// Alerts could not be loaded or transitions could not be persisted
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("Failed to load active alerts: {0}")]
    LoadAlerts(String),

    #[error("Failed to load devices for alert {alert_id}: {reason}")]
    DeviceLookup { alert_id: i64, reason: String },

    #[error("Failed to persist alert transitions: {0}")]
    Persist(String),
}

impl Serialize for CycleError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of one monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub trace_id: String,
    pub status: CycleStatus,
    pub active_alerts: usize,
    /// Alerts that transitioned to triggered and were persisted
    pub triggered_count: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    /// The batched price fetch timed out; no alert was evaluated
    pub price_fetch_timed_out: bool,
    pub errors: Vec<CycleError>,
}

impl CycleOutcome {
    fn new(trace_id: String, status: CycleStatus) -> Self {
        Self {
            trace_id,
            status,
            active_alerts: 0,
            triggered_count: 0,
            notifications_sent: 0,
            notifications_failed: 0,
            price_fetch_timed_out: false,
            errors: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == CycleStatus::Failed
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Evaluates active alerts against live prices.
pub struct AlertMonitor {
    market_data: Arc<dyn MarketDataPort>,
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn NotificationSink>,
    price_timeout: Duration,
    /// Held for the duration of a cycle; a second caller skips instead of waiting
    running: Mutex<()>,
}

impl AlertMonitor {
    pub fn new(
        market_data: Arc<dyn MarketDataPort>,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn NotificationSink>,
        price_timeout: Duration,
    ) -> Self {
        Self {
            market_data,
            store,
            notifier,
            price_timeout,
            running: Mutex::new(()),
        }
    }

    /// Run one cycle. Never panics or returns early with an error; failures
    /// are reported in the outcome.
    pub async fn run_monitoring_cycle(&self) -> CycleOutcome {
        let trace_id = generate_trace_id();

        let Ok(_guard) = self.running.try_lock() else {
            warn!(trace_id = %trace_id, "Monitoring cycle already in progress, skipping");
            return CycleOutcome::new(trace_id, CycleStatus::Skipped);
        };

        let span = tracing::info_span!("alert_cycle", trace_id = %trace_id);
        self.run_locked(trace_id).instrument(span).await
    }

    async fn run_locked(&self, trace_id: String) -> CycleOutcome {
        let alerts = match self.store.load_active_alerts().await {
            Ok(alerts) => alerts,
            Err(e) => {
                error!(error = %e, "Failed to load active alerts");
                let mut outcome = CycleOutcome::new(trace_id, CycleStatus::Failed);
                outcome.errors.push(CycleError::LoadAlerts(e.to_string()));
                return outcome;
            }
        };

        if alerts.is_empty() {
            debug!("No active alerts");
            return CycleOutcome::new(trace_id, CycleStatus::NoActiveAlerts);
        }

        let mut outcome = CycleOutcome::new(trace_id, CycleStatus::Completed);
        outcome.active_alerts = alerts.len();

        let tickers: BTreeSet<String> = alerts.iter().map(|a| a.ticker.clone()).collect();
        let prices = self.fetch_prices(&tickers, &mut outcome).await;

        let triggered: Vec<(&PriceAlert, f64)> = alerts
            .iter()
            .filter_map(|alert| {
                let price = *prices.get(&alert.ticker)?;
                alert
                    .direction
                    .is_triggered(alert.target_price, price)
                    .then_some((alert, price))
            })
            .collect();

        let mut transitions = Vec::with_capacity(triggered.len());
        for (alert, price) in triggered {
            let tokens = match self.store.load_device_tokens(&alert.owner_id).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    // Left active so the next cycle retries it
                    warn!(alert_id = alert.id, error = %e, "Device lookup failed");
                    outcome.errors.push(CycleError::DeviceLookup {
                        alert_id: alert.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            info!(
                alert_id = alert.id,
                ticker = %alert.ticker,
                target = alert.target_price,
                price,
                devices = tokens.len(),
                "Price alert triggered"
            );

            let (sent, failed) = self.notify(alert, price, &tokens).await;
            outcome.notifications_sent += sent;
            outcome.notifications_failed += failed;
            transitions.push(alert.id);
        }

        if transitions.is_empty() {
            return outcome;
        }

        match self.store.persist_alert_transitions(&transitions).await {
            Ok(flipped) => {
                outcome.triggered_count = flipped;
                info!(triggered = flipped, "Monitoring cycle complete");
            }
            Err(e) => {
                error!(error = %e, pending = transitions.len(), "Failed to persist alert transitions");
                outcome.status = CycleStatus::Failed;
                outcome.errors.push(CycleError::Persist(e.to_string()));
            }
        }

        outcome
    }

    /// Batched price fetch bounded by the configured timeout; a timeout
    /// counts as no prices at all.
    async fn fetch_prices(&self, tickers: &BTreeSet<String>, outcome: &mut CycleOutcome) -> HashMap<String, f64> {
        match tokio::time::timeout(self.price_timeout, self.market_data.get_current_prices(tickers)).await {
            Ok(prices) => {
                debug!(requested = tickers.len(), priced = prices.len(), "Fetched current prices");
                prices.into_iter().filter(|(_, p)| p.is_finite()).collect()
            }
            Err(_) => {
                warn!(
                    tickers = tickers.len(),
                    timeout_ms = self.price_timeout.as_millis() as u64,
                    "Price fetch timed out"
                );
                outcome.price_fetch_timed_out = true;
                HashMap::new()
            }
        }
    }

    /// Send to every device concurrently. Returns (sent, failed).
    async fn notify(&self, alert: &PriceAlert, price: f64, tokens: &[String]) -> (usize, usize) {
        let (title, body) = alert.notification_text(price);

        let results = join_all(
            tokens
                .iter()
                .map(|token| self.notifier.dispatch(token, &title, &body)),
        )
        .await;

        let mut sent = 0;
        let mut failed = 0;
        for result in results {
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!(alert_id = alert.id, error = %e, "Notification dispatch failed");
                }
            }
        }
        (sent, failed)
    }
}

#[async_trait]
impl ScheduledJob for AlertMonitor {
    fn name(&self) -> &'static str {
        "alert-monitor"
    }

    /// A `Failed` cycle is a failed run; skipped and empty cycles are not.
    async fn run_scheduled(&self) -> Result<(), String> {
        let outcome = self.run_monitoring_cycle().await;
        if outcome.is_failure() {
            Err(outcome
                .errors
                .last()
                .map_or_else(|| "monitoring cycle failed".to_string(), ToString::to_string))
        } else {
            Ok(())
        }
    }
}
