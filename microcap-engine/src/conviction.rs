//! Conviction score synthesis.
//!
//! Starts from a neutral 5.0 and applies independent additive adjustments:
//!
//! | Signal | Condition | Adjustment |
//! |--------|-----------|------------|
//! | Composite risk score | > 75 | −3.0 |
//! | Composite risk score | > 50 | −1.5 |
//! | Insider sentiment | Bullish / Bearish | +2.5 / −1.5 |
//! | Technical trend | StrongUptrend / StrongDowntrend | +2.0 / −2.0 |
//! | Thesis strength | 5 / 4 / ≤2 | +3.0 / +1.5 / −2.0 |
//!
//! Any missing hub section abstains. The result is clamped to [0, 10].

use serde::{Deserialize, Serialize};

use crate::hub::{AnalysisHub, InsiderSentiment};
use crate::technical::Trend;

const NEUTRAL_SCORE: f64 = 5.0;
const MAX_SCORE: f64 = 10.0;

/// Qualitative input from the curation portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystInput {
    /// Thesis strength on a 1-5 scale
    #[serde(default = "default_thesis_strength")]
    pub thesis_strength: u8,
}

fn default_thesis_strength() -> u8 {
    3
}

impl Default for AnalystInput {
    fn default() -> Self {
        Self {
            thesis_strength: default_thesis_strength(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    HighConviction,
    StrongOpportunity,
    Monitor,
    LowConviction,
}

impl Classification {
    /// Band for a clamped score; lower bounds inclusive.
    pub fn from_score(score: f64) -> Self {
        if score >= 8.5 {
            Self::HighConviction
        } else if score >= 7.0 {
            Self::StrongOpportunity
        } else if score >= 5.0 {
            Self::Monitor
        } else {
            Self::LowConviction
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighConviction => write!(f, "High Conviction"),
            Self::StrongOpportunity => write!(f, "Strong Opportunity"),
            Self::Monitor => write!(f, "Monitor"),
            Self::LowConviction => write!(f, "Low Conviction"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvictionResult {
    /// In [0, 10], one decimal place
    pub score: f64,
    pub classification: Classification,
}

/// Fuse hub signals and analyst input into a bounded score.
pub fn synthesize_conviction(hub: &AnalysisHub, input: &AnalystInput) -> ConvictionResult {
    let mut score = NEUTRAL_SCORE;

    if let Some(risk) = hub.composite_risk_score().filter(|r| r.is_finite()) {
        if risk > 75.0 {
            score -= 3.0;
        } else if risk > 50.0 {
            score -= 1.5;
        }
    }

    match hub.insider_sentiment() {
        Some(InsiderSentiment::Bullish) => score += 2.5,
        Some(InsiderSentiment::Bearish) => score -= 1.5,
        _ => {}
    }

    match hub.trend() {
        Some(Trend::StrongUptrend) => score += 2.0,
        Some(Trend::StrongDowntrend) => score -= 2.0,
        _ => {}
    }

    score += match input.thesis_strength {
        5 => 3.0,
        4 => 1.5,
        s if s <= 2 => -2.0,
        _ => 0.0,
    };

    let clamped = score.clamp(0.0, MAX_SCORE);

    ConvictionResult {
        score: (clamped * 10.0).round() / 10.0,
        classification: Classification::from_score(clamped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{InsiderActivity, RedFlagSummary, TechnicalsSection};
    use crate::technical::TechnicalReading;
    use chrono::Utc;

    fn hub(risk: Option<f64>, insider: Option<InsiderSentiment>, trend: Option<Trend>) -> AnalysisHub {
        AnalysisHub {
            ticker: "TEST".into(),
            red_flags: Some(RedFlagSummary {
                composite_risk_score: risk,
                flags: Vec::new(),
            }),
            insider_activity: Some(InsiderActivity {
                sentiment: insider,
                net_shares: None,
            }),
            technicals: trend.map(|trend| {
                TechnicalsSection::Reading(TechnicalReading {
                    as_of: Utc::now(),
                    close: 10.0,
                    sma_50: 9.0,
                    sma_200: Some(8.0),
                    rsi_14: 55.0,
                    trend,
                    signals: Vec::new(),
                })
            }),
            ..AnalysisHub::default()
        }
    }

    fn thesis(strength: u8) -> AnalystInput {
        AnalystInput {
            thesis_strength: strength,
        }
    }

    #[test]
    fn test_strong_signals_combine() {
        let result = synthesize_conviction(
            &hub(Some(80.0), Some(InsiderSentiment::Bullish), Some(Trend::StrongUptrend)),
            &thesis(5),
        );
        // 5 - 3 + 2.5 + 2 + 3
        assert_eq!(result.score, 9.5);
        assert_eq!(result.classification, Classification::HighConviction);
    }

    #[test]
    fn test_all_missing_is_neutral() {
        let result = synthesize_conviction(&AnalysisHub::default(), &AnalystInput::default());
        assert_eq!(result.score, 5.0);
        assert_eq!(result.classification, Classification::Monitor);
    }

    #[test]
    fn test_risk_bands() {
        let score = |risk: f64| synthesize_conviction(&hub(Some(risk), None, None), &thesis(3)).score;
        assert_eq!(score(50.0), 5.0);
        assert_eq!(score(50.5), 3.5);
        assert_eq!(score(75.0), 3.5);
        assert_eq!(score(75.5), 2.0);
        assert_eq!(score(f64::NAN), 5.0);
    }

    #[test]
    fn test_thesis_adjustments() {
        let score = |s: u8| synthesize_conviction(&AnalysisHub::default(), &thesis(s)).score;
        assert_eq!(score(5), 8.0);
        assert_eq!(score(4), 6.5);
        assert_eq!(score(3), 5.0);
        assert_eq!(score(2), 3.0);
        assert_eq!(score(1), 3.0);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let high = synthesize_conviction(
            &hub(None, Some(InsiderSentiment::Bullish), Some(Trend::StrongUptrend)),
            &thesis(5),
        );
        assert_eq!(high.score, 10.0);
        assert_eq!(high.classification, Classification::HighConviction);

        let low = synthesize_conviction(
            &hub(Some(90.0), Some(InsiderSentiment::Bearish), Some(Trend::StrongDowntrend)),
            &thesis(1),
        );
        assert_eq!(low.score, 0.0);
        assert_eq!(low.classification, Classification::LowConviction);
    }

    #[test]
    fn test_neutral_sentiment_and_plain_trend_abstain() {
        let result = synthesize_conviction(
            &hub(None, Some(InsiderSentiment::Neutral), Some(Trend::Uptrend)),
            &thesis(3),
        );
        assert_eq!(result.score, 5.0);
    }

    #[test]
    fn test_classification_bands() {
        assert_eq!(Classification::from_score(10.0), Classification::HighConviction);
        assert_eq!(Classification::from_score(8.5), Classification::HighConviction);
        assert_eq!(Classification::from_score(8.49), Classification::StrongOpportunity);
        assert_eq!(Classification::from_score(7.0), Classification::StrongOpportunity);
        assert_eq!(Classification::from_score(6.99), Classification::Monitor);
        assert_eq!(Classification::from_score(5.0), Classification::Monitor);
        assert_eq!(Classification::from_score(4.99), Classification::LowConviction);
        assert_eq!(Classification::from_score(0.0), Classification::LowConviction);
    }

    #[test]
    fn test_analyst_input_default_thesis() {
        let input: AnalystInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.thesis_strength, 3);
    }
}
