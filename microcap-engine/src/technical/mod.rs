//! Technical signal engine.
//!
//! Derives moving averages, RSI momentum and a trend classification from a
//! daily price series, and emits discrete named signals:
//!
//! - **GoldenCross** / **DeathCross**: SMA(50) crossing SMA(200) between the
//!   two most recent points
//! - **Overbought** / **Oversold**: RSI(14) above 70 / below 30
//!
//! A reading needs at least 50 points; SMA(200) and crossovers need 200+.

mod engine;
pub mod indicators;

pub use engine::{analyze_technicals, classify_trend, crossover_signal, momentum_signal, TechnicalSignalEngine};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Why no technical reading could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TechnicalError {
    /// The provider returned nothing usable
    #[error("No price data available")]
    DataUnavailable,

    /// Data exists but is too short for a reliable indicator
    #[error("Insufficient price history: need {required} points, have {available}")]
    InsufficientHistory { required: usize, available: usize },
}

// ============================================================================
// Reading
// ============================================================================

/// Trend state from the latest close against SMA(50) and SMA(200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    StrongUptrend,
    Uptrend,
    Neutral,
    Downtrend,
    StrongDowntrend,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongUptrend => write!(f, "Strong Uptrend"),
            Self::Uptrend => write!(f, "Uptrend"),
            Self::Neutral => write!(f, "Neutral"),
            Self::Downtrend => write!(f, "Downtrend"),
            Self::StrongDowntrend => write!(f, "Strong Downtrend"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    GoldenCross,
    DeathCross,
    Overbought,
    Oversold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    Bearish,
}

/// A discrete technical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: SignalKind,
    pub sentiment: Sentiment,
    pub description: String,
}

/// Indicator values and signals at the most recent point of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReading {
    /// Timestamp of the latest point
    pub as_of: DateTime<Utc>,
    pub close: f64,
    pub sma_50: f64,
    /// Present only with 200+ points
    pub sma_200: Option<f64>,
    pub rsi_14: f64,
    pub trend: Trend,
    /// Crossover signals first, then momentum signals
    pub signals: Vec<Signal>,
}

impl TechnicalReading {
    pub fn has_signal(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.name == kind)
    }
}
