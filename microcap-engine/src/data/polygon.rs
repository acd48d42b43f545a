//! Polygon + Tiingo adapter.
//!
//! # Endpoints
//! - Polygon `/v2/aggs/ticker/{ticker}/range/1/day/{from}/{to}` : daily OHLCV
//! - Polygon `/v2/snapshot/locale/us/markets/stocks/tickers` : last trades, batched
//! - Tiingo `/tiingo/fundamentals/{ticker}/ownership` : 13F holdings
//!
//! Every call fails soft: errors are logged and mapped to an empty result.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use microcap_common::config::Config;

use super::provider::{MarketDataPort, ProviderError};
use super::{HoldingRecord, PricePoint, PriceSeries};

// ============================================================================
// Response Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Vec<AggBar>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    /// Bar start, unix milliseconds
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(default)]
    tickers: Vec<TickerSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerSnapshot {
    ticker: String,
    #[serde(default)]
    last_trade: Option<LastTrade>,
}

#[derive(Debug, Deserialize)]
struct LastTrade {
    #[serde(default)]
    p: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwnershipResponse {
    #[serde(default)]
    ownership: Vec<HoldingRecord>,
}

// ============================================================================
// Adapter
// ============================================================================

/// Market data from Polygon (prices) and Tiingo (ownership).
pub struct PolygonTiingoProvider {
    polygon_key: Option<String>,
    tiingo_key: Option<String>,
    polygon_base: String,
    tiingo_base: String,
    client: reqwest::Client,
}

impl PolygonTiingoProvider {
    /// Create a provider against explicit base URLs.
    pub fn new(
        polygon_key: Option<String>,
        tiingo_key: Option<String>,
        polygon_base: impl Into<String>,
        tiingo_base: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            polygon_key: polygon_key.filter(|k| !k.is_empty()),
            tiingo_key: tiingo_key.filter(|k| !k.is_empty()),
            polygon_base: polygon_base.into().trim_end_matches('/').to_string(),
            tiingo_base: tiingo_base.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.secrets.polygon_api_key.clone(),
            config.secrets.tiingo_api_key.clone(),
            config.market_data.polygon_base_url.clone(),
            config.market_data.tiingo_base_url.clone(),
            Duration::from_secs(config.market_data.request_timeout_secs),
        )
    }

    fn check_status(
        provider: &'static str,
        status: reqwest::StatusCode,
    ) -> Result<(), ProviderError> {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(provider));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn fetch_daily_bars(
        &self,
        ticker: &str,
        lookback: usize,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        let key = self
            .polygon_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("polygon"))?;

        // Calendar-day span with room for weekends and holidays
        let to = Utc::now().date_naive();
        let from = to - ChronoDuration::days((lookback as i64) * 3 / 2 + 10);

        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.polygon_base,
            ticker,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        debug!(ticker, lookback, "Fetching daily aggregates from Polygon");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "5000"),
                ("apiKey", key),
            ])
            .send()
            .await?;
        Self::check_status("polygon", response.status())?;

        let body: AggsResponse = response.json().await?;

        Ok(body
            .results
            .into_iter()
            .filter_map(|bar| {
                let timestamp = Utc.timestamp_millis_opt(bar.t).single()?;
                Some(PricePoint {
                    timestamp,
                    open: bar.o,
                    high: bar.h,
                    low: bar.l,
                    close: bar.c,
                    volume: bar.v,
                })
            })
            .collect())
    }

    async fn fetch_snapshot(
        &self,
        tickers: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, ProviderError> {
        let key = self
            .polygon_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("polygon"))?;

        let joined = tickers.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers",
            self.polygon_base
        );

        let response = self
            .client
            .get(&url)
            .query(&[("tickers", joined.as_str()), ("apiKey", key)])
            .send()
            .await?;
        Self::check_status("polygon", response.status())?;

        let body: SnapshotResponse = response.json().await?;

        Ok(body
            .tickers
            .into_iter()
            .filter_map(|snap| {
                let price = snap.last_trade.and_then(|t| t.p)?;
                (price.is_finite() && price > 0.0).then_some((snap.ticker, price))
            })
            .collect())
    }

    async fn fetch_ownership(&self, ticker: &str) -> Result<Vec<HoldingRecord>, ProviderError> {
        let key = self
            .tiingo_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("tiingo"))?;

        let url = format!(
            "{}/tiingo/fundamentals/{}/ownership",
            self.tiingo_base, ticker
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", key))
            .header("Content-Type", "application/json")
            .send()
            .await?;
        Self::check_status("tiingo", response.status())?;

        let body: OwnershipResponse = response.json().await?;
        Ok(body.ownership)
    }
}

#[async_trait]
impl MarketDataPort for PolygonTiingoProvider {
    fn name(&self) -> &'static str {
        "polygon+tiingo"
    }

    async fn get_price_series(&self, ticker: &str, lookback: usize) -> PriceSeries {
        match self.fetch_daily_bars(ticker, lookback).await {
            Ok(points) => {
                let series = PriceSeries::new(points);
                PriceSeries::new(series.tail(lookback).to_vec())
            }
            Err(e) => {
                warn!(ticker, error = %e, "Price history unavailable");
                PriceSeries::empty()
            }
        }
    }

    async fn get_current_prices(&self, tickers: &BTreeSet<String>) -> HashMap<String, f64> {
        if tickers.is_empty() {
            return HashMap::new();
        }

        match self.fetch_snapshot(tickers).await {
            Ok(prices) => {
                if prices.len() < tickers.len() {
                    debug!(
                        requested = tickers.len(),
                        priced = prices.len(),
                        "Snapshot omitted some tickers"
                    );
                }
                prices
            }
            Err(e) => {
                warn!(requested = tickers.len(), error = %e, "Current prices unavailable");
                HashMap::new()
            }
        }
    }

    async fn get_institutional_holdings(&self, ticker: &str) -> Vec<HoldingRecord> {
        match self.fetch_ownership(ticker).await {
            Ok(records) => records,
            Err(e) => {
                warn!(ticker, error = %e, "Institutional ownership unavailable");
                Vec::new()
            }
        }
    }
}
