//! Per-ticker analysis hub.
//!
//! The hub bundles everything known about one ticker at request time. The
//! technicals and ownership sections are computed here from market data;
//! red flags, insider activity, liquidity and sentiment come from external
//! collaborators and are carried through as supplied.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::data::MarketDataPort;
use crate::ownership::{analyze_ownership, OwnershipSummary};
use crate::technical::{TechnicalReading, TechnicalSignalEngine, Trend};

// ============================================================================
// External sections
// ============================================================================

/// Forensic accounting risk summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedFlagSummary {
    /// 0-100, higher is riskier
    #[serde(default)]
    pub composite_risk_score: Option<f64>,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InsiderSentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl<'de> Deserialize<'de> for InsiderSentiment {
    /// Anything other than Bullish/Bearish reads as Neutral.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_ascii_lowercase().as_str() {
            "bullish" => Self::Bullish,
            "bearish" => Self::Bearish,
            _ => Self::Neutral,
        })
    }
}

/// Recent insider transaction summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsiderActivity {
    #[serde(default)]
    pub sentiment: Option<InsiderSentiment>,
    #[serde(default)]
    pub net_shares: Option<f64>,
}

/// Sections supplied by callers rather than computed from market data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalSections {
    #[serde(default)]
    pub red_flags: Option<RedFlagSummary>,
    #[serde(default)]
    pub insider_activity: Option<InsiderActivity>,
    #[serde(default)]
    pub liquidity: Option<serde_json::Value>,
    #[serde(default)]
    pub sentiment: Option<serde_json::Value>,
}

// ============================================================================
// Hub
// ============================================================================

/// Technicals section: a reading, or the reason there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TechnicalsSection {
    Reading(TechnicalReading),
    Unavailable { error: String },
}

impl TechnicalsSection {
    pub fn trend(&self) -> Option<Trend> {
        match self {
            Self::Reading(reading) => Some(reading.trend),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Everything known about one ticker, assembled per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisHub {
    pub ticker: String,
    #[serde(default)]
    pub red_flags: Option<RedFlagSummary>,
    #[serde(default)]
    pub insider_activity: Option<InsiderActivity>,
    #[serde(default)]
    pub liquidity: Option<serde_json::Value>,
    #[serde(default)]
    pub technicals: Option<TechnicalsSection>,
    #[serde(default)]
    pub ownership: Option<OwnershipSummary>,
    #[serde(default)]
    pub sentiment: Option<serde_json::Value>,
}

impl AnalysisHub {
    /// Hub carrying only the externally supplied sections.
    pub fn from_external(ticker: &str, external: ExternalSections) -> Self {
        Self {
            ticker: ticker.to_string(),
            red_flags: external.red_flags,
            insider_activity: external.insider_activity,
            liquidity: external.liquidity,
            technicals: None,
            ownership: None,
            sentiment: external.sentiment,
        }
    }

    pub fn composite_risk_score(&self) -> Option<f64> {
        self.red_flags.as_ref()?.composite_risk_score
    }

    pub fn insider_sentiment(&self) -> Option<InsiderSentiment> {
        self.insider_activity.as_ref()?.sentiment
    }

    pub fn trend(&self) -> Option<Trend> {
        self.technicals.as_ref()?.trend()
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// Builds hubs from market data.
#[derive(Clone)]
pub struct HubAssembler {
    market_data: Arc<dyn MarketDataPort>,
    engine: TechnicalSignalEngine,
    lookback: usize,
}

impl HubAssembler {
    pub fn new(market_data: Arc<dyn MarketDataPort>, lookback: usize) -> Self {
        Self {
            market_data,
            engine: TechnicalSignalEngine::default(),
            lookback,
        }
    }

    /// Fetch price history and holdings concurrently, then analyze both.
    pub async fn assemble(&self, ticker: &str, external: ExternalSections) -> AnalysisHub {
        let ticker = ticker.trim().to_ascii_uppercase();

        let (series, holdings) = tokio::join!(
            self.market_data.get_price_series(&ticker, self.lookback),
            self.market_data.get_institutional_holdings(&ticker),
        );

        let technicals = match self.engine.analyze(&series) {
            Ok(reading) => TechnicalsSection::Reading(reading),
            Err(e) => {
                debug!(ticker = %ticker, error = %e, "Technicals unavailable");
                TechnicalsSection::Unavailable { error: e.to_string() }
            }
        };
        let ownership = analyze_ownership(&holdings);

        info!(
            ticker = %ticker,
            points = series.len(),
            holders = ownership.top_holders.len(),
            "Analysis hub assembled"
        );

        AnalysisHub {
            technicals: Some(technicals),
            ownership: Some(ownership),
            ..AnalysisHub::from_external(&ticker, external)
        }
    }
}
