//! Market data provider abstraction.
//!
//! Defines the `MarketDataPort` trait every data source implements. The
//! pipeline only ever talks to this trait, so tests substitute deterministic
//! fakes and production wires in `PolygonTiingoProvider`.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use super::{HoldingRecord, PriceSeries};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors raised inside a provider adapter.
///
/// These never cross the `MarketDataPort` boundary: adapters log them and
/// return an empty (fail-soft) result instead.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// No API key configured for the provider
    #[error("Provider not configured: {0}")]
    NotConfigured(&'static str),

    /// Rate limit exceeded
    #[error("Rate limited by {0}")]
    RateLimited(&'static str),

    /// Non-success HTTP status
    #[error("HTTP {status} from {provider}")]
    Status { provider: &'static str, status: u16 },

    /// Response body did not match the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying on the next cycle)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_))
            || matches!(self, Self::Status { status, .. } if *status >= 500)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

// ============================================================================
// Market Data Port
// ============================================================================

/// Point-in-time prices, price history and ownership data for tickers.
///
/// Every method fails soft: a provider problem yields an empty result and
/// never an error.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Daily price history, at most `lookback` most recent points.
    ///
    /// Returns an empty series on any provider error.
    async fn get_price_series(&self, ticker: &str, lookback: usize) -> PriceSeries;

    /// Latest trade price for each ticker in one batched call.
    ///
    /// Tickers the provider cannot price are omitted from the map.
    async fn get_current_prices(&self, tickers: &BTreeSet<String>) -> HashMap<String, f64>;

    /// Institutional holding records. Empty on error.
    async fn get_institutional_holdings(&self, ticker: &str) -> Vec<HoldingRecord>;
}
