//! Quantitative filtering for the universe screener.
//!
//! Implements the funnel that every instrument must pass:
//! 1. Cleaning: rows with a missing or non-finite numeric field are dropped
//! 2. Size: market cap ≥ minimum
//! 3. Liquidity: daily volume ≥ minimum
//! 4. Quality: ROIC ≥ minimum
//! 5. Valuation: PE > 0 (profitable companies only)

use microcap_common::config::ScreenerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Instrument, UniverseRow};

// ============================================================================
// Filter Stage
// ============================================================================

/// Filter stage identifier for tracking where instruments are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Drop malformed rows
    Cleaning,
    /// Market cap floor
    Size,
    /// Daily volume floor
    Liquidity,
    /// ROIC floor
    Quality,
    /// Positive earnings
    Valuation,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cleaning => write!(f, "cleaning"),
            Self::Size => write!(f, "market cap"),
            Self::Liquidity => write!(f, "liquidity"),
            Self::Quality => write!(f, "quality"),
            Self::Valuation => write!(f, "valuation"),
        }
    }
}

// ============================================================================
// Filter Result
// ============================================================================

/// Result of a filtering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub stage: FilterStage,
    /// Number of instruments that passed this stage
    pub passed: usize,
    /// Number of instruments eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

// ============================================================================
// Universe Screener
// ============================================================================

/// Hard eligibility filter over a universe snapshot.
///
/// Pure and order-preserving: the output is a subsequence of the input.
#[derive(Debug, Clone)]
pub struct UniverseScreener {
    config: ScreenerConfig,
}

impl UniverseScreener {
    /// Create a new screener with the given thresholds.
    pub fn new(config: ScreenerConfig) -> Self {
        Self { config }
    }

    /// Create with default thresholds ($50M cap, 100k volume, 10% ROIC).
    pub fn with_defaults() -> Self {
        Self::new(ScreenerConfig::default())
    }

    /// Convert raw rows to instruments, dropping malformed rows, then screen.
    pub fn screen_rows(&self, rows: &[UniverseRow]) -> Vec<Instrument> {
        let instruments: Vec<Instrument> = rows.iter().filter_map(UniverseRow::to_instrument).collect();

        debug!(
            rows = rows.len(),
            well_formed = instruments.len(),
            "Universe rows cleaned"
        );

        self.screen(&instruments)
    }

    /// Apply every predicate. Instruments with non-finite fields never pass.
    pub fn screen(&self, instruments: &[Instrument]) -> Vec<Instrument> {
        instruments
            .iter()
            .filter(|i| i.is_well_formed() && self.passes_all(i))
            .cloned()
            .collect()
    }

    /// Screen stage by stage, reporting how many instruments each stage removed.
    pub fn screen_with_report(&self, instruments: &[Instrument]) -> (Vec<Instrument>, Vec<FilterResult>) {
        let stages: [(FilterStage, fn(&Self, &Instrument) -> bool); 5] = [
            (FilterStage::Cleaning, |_, i| i.is_well_formed()),
            (FilterStage::Size, Self::passes_size),
            (FilterStage::Liquidity, Self::passes_liquidity),
            (FilterStage::Quality, Self::passes_quality),
            (FilterStage::Valuation, Self::passes_valuation),
        ];

        let mut current: Vec<Instrument> = instruments.to_vec();
        let mut report = Vec::with_capacity(stages.len());

        for (stage, predicate) in stages {
            let input_count = current.len();
            current.retain(|i| predicate(self, i));
            report.push(FilterResult::new(stage, input_count, current.len()));
        }

        (current, report)
    }

    fn passes_all(&self, instrument: &Instrument) -> bool {
        self.passes_size(instrument)
            && self.passes_liquidity(instrument)
            && self.passes_quality(instrument)
            && self.passes_valuation(instrument)
    }

    fn passes_size(&self, instrument: &Instrument) -> bool {
        instrument.market_cap >= self.config.min_market_cap
    }

    fn passes_liquidity(&self, instrument: &Instrument) -> bool {
        instrument.daily_volume >= self.config.min_liquidity
    }

    fn passes_quality(&self, instrument: &Instrument) -> bool {
        instrument.roic >= self.config.min_roic
    }

    fn passes_valuation(&self, instrument: &Instrument) -> bool {
        instrument.pe_ratio > 0.0
    }
}

// ============================================================================
// Tests
// ============================================================================
