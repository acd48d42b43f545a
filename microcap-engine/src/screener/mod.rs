//! Universe screener module.
//!
//! Turns a raw universe snapshot into a ranked candidate list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ UniverseRow  │────▶│ UniverseScreener │────▶│ CompositeRanker  │
//! │  (raw JSON)  │     │  hard filters    │     │ percentile ranks │
//! └──────────────┘     └──────────────────┘     └────────┬─────────┘
//!                                                        │
//!                                               top-K candidate queue
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use microcap_engine::screener::{screen_and_rank, Instrument};
//!
//! let ranked = screen_and_rank(&ScreenerConfig::default(), &universe);
//! let candidates: Vec<_> = ranked.into_iter().take(10).collect();
//! ```

pub mod quantitative;
pub mod ranking;

pub use quantitative::{FilterResult, FilterStage, UniverseScreener};
pub use ranking::{CompositeRanker, RankedInstrument};

use microcap_common::config::ScreenerConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// Instrument
// ============================================================================

/// One row of a universe snapshot with every numeric field present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    /// Market capitalisation, in millions of dollars
    pub market_cap: f64,
    pub daily_volume: f64,
    pub pe_ratio: f64,
    /// Return on invested capital as a fraction
    pub roic: f64,
    pub insider_ownership_fraction: f64,
}

impl Instrument {
    /// True when every numeric field is a finite number.
    pub fn is_well_formed(&self) -> bool {
        [
            self.market_cap,
            self.daily_volume,
            self.pe_ratio,
            self.roic,
            self.insider_ownership_fraction,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// A universe row as received from the outside, with any field possibly absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseRow {
    pub ticker: String,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub daily_volume: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub roic: Option<f64>,
    #[serde(default)]
    pub insider_ownership_fraction: Option<f64>,
}

impl UniverseRow {
    /// Convert to an `Instrument`, or `None` if any numeric field is missing or non-finite.
    pub fn to_instrument(&self) -> Option<Instrument> {
        let instrument = Instrument {
            ticker: self.ticker.clone(),
            market_cap: self.market_cap?,
            daily_volume: self.daily_volume?,
            pe_ratio: self.pe_ratio?,
            roic: self.roic?,
            insider_ownership_fraction: self.insider_ownership_fraction?,
        };

        instrument.is_well_formed().then_some(instrument)
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Filter the universe and rank the survivors, best first.
///
/// Returns the full ranked set; truncating to a top-K is up to the caller.
pub fn screen_and_rank(config: &ScreenerConfig, universe: &[Instrument]) -> Vec<RankedInstrument> {
    let screener = UniverseScreener::new(config.clone());
    let (screened, report) = screener.screen_with_report(universe);

    for stage in &report {
        debug!(
            stage = %stage.stage,
            passed = stage.passed,
            eliminated = stage.eliminated,
            "Filter stage complete"
        );
    }

    let ranked = CompositeRanker::default().rank(&screened);

    info!(
        universe = universe.len(),
        screened = screened.len(),
        "Universe screened and ranked"
    );

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ticker: &str) -> UniverseRow {
        UniverseRow {
            ticker: ticker.to_string(),
            market_cap: Some(200.0),
            daily_volume: Some(300_000.0),
            pe_ratio: Some(11.0),
            roic: Some(0.15),
            insider_ownership_fraction: Some(0.1),
        }
    }

    #[test]
    fn test_row_conversion() {
        assert!(row("OK").to_instrument().is_some());

        let mut missing = row("MISS");
        missing.roic = None;
        assert!(missing.to_instrument().is_none());

        let mut nan = row("NAN");
        nan.insider_ownership_fraction = Some(f64::NAN);
        assert!(nan.to_instrument().is_none());
    }

    #[test]
    fn test_screen_and_rank_example() {
        let universe = vec![
            Instrument {
                ticker: "MID".into(),
                market_cap: 100.0,
                daily_volume: 200_000.0,
                pe_ratio: 20.0,
                roic: 0.2,
                insider_ownership_fraction: 0.5,
            },
            Instrument {
                ticker: "BEST".into(),
                market_cap: 100.0,
                daily_volume: 200_000.0,
                pe_ratio: 10.0,
                roic: 0.3,
                insider_ownership_fraction: 0.5,
            },
            Instrument {
                ticker: "WORST".into(),
                market_cap: 100.0,
                daily_volume: 200_000.0,
                pe_ratio: 30.0,
                roic: 0.1,
                insider_ownership_fraction: 0.5,
            },
        ];

        let ranked = screen_and_rank(&ScreenerConfig::default(), &universe);
        let tickers: Vec<&str> = ranked.iter().map(|r| r.instrument.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BEST", "MID", "WORST"]);
    }

    #[test]
    fn test_screen_and_rank_empty() {
        assert!(screen_and_rank(&ScreenerConfig::default(), &[]).is_empty());
    }
}
