//! Market data module.
//!
//! Core data shapes consumed by the pipeline plus the `MarketDataPort`
//! abstraction and its Polygon/Tiingo adapter.
//!
//! # Data Sources
//! - **Polygon** : daily aggregates (OHLCV) and batched last-trade snapshots
//! - **Tiingo** : institutional ownership (13F) records

mod polygon;
mod provider;

pub use polygon::PolygonTiingoProvider;
pub use provider::{MarketDataPort, ProviderError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Price Data
// ============================================================================

/// A single daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    /// Bar with the same value for every price field, handy for close-only data.
    pub fn from_close(timestamp: DateTime<Utc>, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }
}

/// Time-ordered price history for one ticker.
///
/// Points are strictly ascending by timestamp with no duplicates; crossover
/// detection compares adjacent points and relies on this.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, sorting by timestamp. When two points share a
    /// timestamp the later one in the input wins.
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        // Stable sort keeps input order among equal timestamps
        points.sort_by_key(|p| p.timestamp);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => deduped.push(point),
            }
        }

        Self { points: deduped }
    }

    /// Empty series, the fail-soft result of a provider error.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Closing prices in time order.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Most recent point.
    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// The last `n` points (or all of them when the series is shorter).
    pub fn tail(&self, n: usize) -> &[PricePoint] {
        let start = self.points.len().saturating_sub(n);
        &self.points[start..]
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            points: Vec<PricePoint>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(Self::new(raw.points))
    }
}

// ============================================================================
// Ownership Data
// ============================================================================

/// One institutional holding record (13F line) as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingRecord {
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub market_value: Option<f64>,
    #[serde(default)]
    pub change_in_shares: Option<f64>,
}

impl HoldingRecord {
    pub fn new(entity_name: &str, market_value: f64, change_in_shares: f64) -> Self {
        Self {
            entity_name: Some(entity_name.to_string()),
            market_value: Some(market_value),
            change_in_shares: Some(change_in_shares),
        }
    }

    /// Market value usable in sums; missing or non-finite values count as zero.
    pub fn value_or_zero(&self) -> f64 {
        self.market_value.filter(|v| v.is_finite()).unwrap_or(0.0)
    }
}
