//! Sector performance heatmap.
//!
//! Each sector is tracked through a liquid sector ETF. A refresh computes
//! the ETF's latest daily change and upserts it into a `SectorStore`; the
//! HTTP surface serves whatever the store last cached.

pub mod store;

pub use store::{SectorStore, SqliteSectorStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alerts::StoreError;
use crate::data::{MarketDataPort, PriceSeries};
use crate::scheduler::ScheduledJob;

/// Sector name and the ETF used as its proxy.
pub const SECTOR_PROXIES: &[(&str, &str)] = &[
    ("Communication Services", "XLC"),
    ("Consumer Discretionary", "XLY"),
    ("Consumer Staples", "XLP"),
    ("Energy", "XLE"),
    ("Financials", "XLF"),
    ("Healthcare", "XLV"),
    ("Industrials", "XLI"),
    ("Materials", "XLB"),
    ("Real Estate", "XLRE"),
    ("Technology", "XLK"),
    ("Utilities", "XLU"),
];

/// Two closes are enough for a daily change
const HEATMAP_LOOKBACK: usize = 2;

/// Cached daily performance of one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub sector: String,
    pub performance_pct: f64,
    pub last_updated: DateTime<Utc>,
}

/// Percent change between the last two closes.
///
/// `None` when there are fewer than two closes, the previous close is not
/// positive, or the result is not finite.
pub fn daily_change_pct(series: &PriceSeries) -> Option<f64> {
    let [previous, latest] = series.tail(2) else {
        return None;
    };
    if !(previous.close.is_finite() && previous.close > 0.0) {
        return None;
    }

    let pct = (latest.close - previous.close) / previous.close * 100.0;
    pct.is_finite().then_some(pct)
}

/// Recomputes sector performance and writes it to the store.
pub struct HeatmapCalculator {
    market_data: Arc<dyn MarketDataPort>,
    store: Arc<dyn SectorStore>,
    proxies: Vec<(String, String)>,
}

impl HeatmapCalculator {
    pub fn new(market_data: Arc<dyn MarketDataPort>, store: Arc<dyn SectorStore>) -> Self {
        let proxies = SECTOR_PROXIES
            .iter()
            .map(|(sector, etf)| (sector.to_string(), etf.to_string()))
            .collect();
        Self::with_proxies(market_data, store, proxies)
    }

    /// Use a custom `(sector, ticker)` list
    pub fn with_proxies(
        market_data: Arc<dyn MarketDataPort>,
        store: Arc<dyn SectorStore>,
        proxies: Vec<(String, String)>,
    ) -> Self {
        Self {
            market_data,
            store,
            proxies,
        }
    }

    /// Fetch every proxy and upsert the sectors that produced a change.
    ///
    /// Sectors without usable data keep their previously cached row.
    /// Returns the number of sectors written.
    pub async fn refresh(&self) -> Result<usize, StoreError> {
        let fetches = self.proxies.iter().map(|(sector, etf)| async move {
            let series = self.market_data.get_price_series(etf, HEATMAP_LOOKBACK).await;
            (sector, etf, daily_change_pct(&series))
        });

        let now = Utc::now();
        let mut rows = Vec::with_capacity(self.proxies.len());
        for (sector, etf, change) in join_all(fetches).await {
            match change {
                Some(performance_pct) => rows.push(SectorPerformance {
                    sector: sector.clone(),
                    performance_pct,
                    last_updated: now,
                }),
                None => debug!(sector = %sector, etf = %etf, "No usable closes, keeping cached value"),
            }
        }

        if rows.is_empty() {
            warn!(sectors = self.proxies.len(), "Heatmap refresh produced no data");
            return Ok(0);
        }

        let written = self.store.upsert_sector_performance(&rows).await?;
        info!(
            written,
            skipped = self.proxies.len() - rows.len(),
            "Sector heatmap refreshed"
        );
        Ok(written)
    }

    /// Cached rows, strongest sector first.
    pub async fn snapshot(&self) -> Result<Vec<SectorPerformance>, StoreError> {
        self.store.load_sector_performance().await
    }
}

#[async_trait]
impl ScheduledJob for HeatmapCalculator {
    fn name(&self) -> &'static str {
        "sector-heatmap"
    }

    async fn run_scheduled(&self) -> std::result::Result<(), String> {
        self.refresh().await.map(|_| ()).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HoldingRecord, PricePoint};
    use chrono::{Duration, TimeZone};
    use std::collections::{BTreeSet, HashMap};

    struct ClosesMarket {
        closes: HashMap<&'static str, Vec<f64>>,
    }

    #[async_trait]
    impl MarketDataPort for ClosesMarket {
        fn name(&self) -> &'static str {
            "closes"
        }

        async fn get_price_series(&self, ticker: &str, lookback: usize) -> PriceSeries {
            let Some(closes) = self.closes.get(ticker) else {
                return PriceSeries::empty();
            };
            let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
            let points = closes
                .iter()
                .enumerate()
                .map(|(i, c)| PricePoint::from_close(start + Duration::days(i as i64), *c, 1_000.0))
                .collect();
            PriceSeries::new(PriceSeries::new(points).tail(lookback).to_vec())
        }

        async fn get_current_prices(&self, _tickers: &BTreeSet<String>) -> HashMap<String, f64> {
            HashMap::new()
        }

        async fn get_institutional_holdings(&self, _ticker: &str) -> Vec<HoldingRecord> {
            Vec::new()
        }
    }

    fn series(closes: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        PriceSeries::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| PricePoint::from_close(start + Duration::days(i as i64), *c, 1.0))
                .collect(),
        )
    }

    fn calculator(closes: HashMap<&'static str, Vec<f64>>) -> (Arc<SqliteSectorStore>, HeatmapCalculator) {
        let store = Arc::new(SqliteSectorStore::open_in_memory().unwrap());
        let proxies = vec![
            ("Technology".to_string(), "XLK".to_string()),
            ("Energy".to_string(), "XLE".to_string()),
            ("Utilities".to_string(), "XLU".to_string()),
        ];
        let calc = HeatmapCalculator::with_proxies(Arc::new(ClosesMarket { closes }), store.clone(), proxies);
        (store, calc)
    }

    #[test]
    fn test_daily_change_pct() {
        assert!((daily_change_pct(&series(&[90.0, 100.0, 102.5])).unwrap() - 2.5).abs() < 1e-9);
        assert!((daily_change_pct(&series(&[200.0, 199.0])).unwrap() + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_daily_change_needs_two_positive_closes() {
        assert!(daily_change_pct(&PriceSeries::empty()).is_none());
        assert!(daily_change_pct(&series(&[10.0])).is_none());
        assert!(daily_change_pct(&series(&[0.0, 10.0])).is_none());
    }

    #[test]
    fn test_default_proxies_cover_sectors_once() {
        let sectors: BTreeSet<&str> = SECTOR_PROXIES.iter().map(|(s, _)| *s).collect();
        assert_eq!(sectors.len(), SECTOR_PROXIES.len());
        assert!(sectors.contains("Technology"));
        assert!(sectors.contains("Healthcare"));
    }

    #[tokio::test]
    async fn test_refresh_writes_sectors_with_data() {
        let (_store, calc) = calculator(HashMap::from([
            ("XLK", vec![200.0, 205.0]),
            ("XLE", vec![80.0, 79.6]),
        ]));

        assert_eq!(calc.refresh().await.unwrap(), 2);

        let rows = calc.snapshot().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sector, "Technology");
        assert!((rows[0].performance_pct - 2.5).abs() < 1e-9);
        assert_eq!(rows[1].sector, "Energy");
        assert!((rows[1].performance_pct + 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_sector_keeps_cached_value() {
        let (store, calc) = calculator(HashMap::from([("XLK", vec![100.0, 101.0])]));
        let yesterday = SectorPerformance {
            sector: "Utilities".into(),
            performance_pct: 0.2,
            last_updated: Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap(),
        };
        store.upsert_sector_performance(&[yesterday.clone()]).await.unwrap();

        assert_eq!(calc.refresh().await.unwrap(), 1);

        let rows = calc.snapshot().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&yesterday));
    }

    #[tokio::test]
    async fn test_scheduled_run_succeeds_without_data() {
        let (_store, calc) = calculator(HashMap::new());
        assert_eq!(calc.name(), "sector-heatmap");
        assert!(calc.run_scheduled().await.is_ok());
        assert!(calc.snapshot().await.unwrap().is_empty());
    }
}
