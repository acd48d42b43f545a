//! Reading computation over the most recent window of a price series.

use tracing::debug;

use super::indicators::{rsi, sma};
use super::{Sentiment, Signal, SignalKind, TechnicalError, TechnicalReading, Trend};
use crate::data::PriceSeries;

/// Indicator parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TechnicalSignalEngine {
    pub short_window: usize,
    pub long_window: usize,
    pub rsi_period: usize,
    pub overbought: f64,
    pub oversold: f64,
    pub min_history: usize,
}

impl Default for TechnicalSignalEngine {
    fn default() -> Self {
        Self {
            short_window: 50,
            long_window: 200,
            rsi_period: 14,
            overbought: 70.0,
            oversold: 30.0,
            min_history: 50,
        }
    }
}

impl TechnicalSignalEngine {
    /// Compute a reading at the latest point of `series`.
    ///
    /// Only the last `long_window + 1` points are used: the long window itself
    /// plus the prior point needed to detect a crossover.
    pub fn analyze(&self, series: &PriceSeries) -> Result<TechnicalReading, TechnicalError> {
        if series.is_empty() {
            return Err(TechnicalError::DataUnavailable);
        }
        if series.len() < self.min_history {
            return Err(TechnicalError::InsufficientHistory {
                required: self.min_history,
                available: series.len(),
            });
        }

        let window = series.tail(self.long_window + 1);
        let closes: Vec<f64> = window.iter().map(|p| p.close).collect();
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(TechnicalError::DataUnavailable);
        }

        let short = sma(&closes, self.short_window);
        let long = sma(&closes, self.long_window);
        let momentum = rsi(&closes, self.rsi_period);

        let last = closes.len() - 1;
        let close = closes[last];
        let sma_50 = short[last];
        let sma_200 = defined(long[last]);
        let rsi_14 = momentum[last];

        let mut signals = Vec::new();
        if last >= 1 {
            if let (Some(prev_long), Some(last_long)) = (defined(long[last - 1]), sma_200) {
                signals.extend(crossover_signal((short[last - 1], prev_long), (sma_50, last_long)));
            }
        }
        signals.extend(self.momentum(rsi_14));

        let trend = classify_trend(close, sma_50, sma_200);
        let as_of = window[last].timestamp;

        debug!(
            close,
            sma_50,
            sma_200 = ?sma_200,
            rsi_14,
            trend = %trend,
            signals = signals.len(),
            "Technical reading computed"
        );

        Ok(TechnicalReading {
            as_of,
            close,
            sma_50,
            sma_200,
            rsi_14,
            trend,
            signals,
        })
    }

    fn momentum(&self, rsi_value: f64) -> Option<Signal> {
        if rsi_value > self.overbought {
            Some(Signal {
                name: SignalKind::Overbought,
                sentiment: Sentiment::Bearish,
                description: format!("RSI(14) at {rsi_value:.1} is above {:.0}: momentum may be stretched.", self.overbought),
            })
        } else if rsi_value < self.oversold {
            Some(Signal {
                name: SignalKind::Oversold,
                sentiment: Sentiment::Bullish,
                description: format!("RSI(14) at {rsi_value:.1} is below {:.0}: selling may be exhausted.", self.oversold),
            })
        } else {
            None
        }
    }
}

/// Analyze with the standard 50/200/14 parameters.
pub fn analyze_technicals(series: &PriceSeries) -> Result<TechnicalReading, TechnicalError> {
    TechnicalSignalEngine::default().analyze(series)
}

/// Momentum signal for an RSI value with the standard 70/30 bands (both strict).
pub fn momentum_signal(rsi_value: f64) -> Option<Signal> {
    TechnicalSignalEngine::default().momentum(rsi_value)
}

/// Crossover between two consecutive `(short, long)` average pairs.
pub fn crossover_signal(prior: (f64, f64), latest: (f64, f64)) -> Option<Signal> {
    let (prev_short, prev_long) = prior;
    let (last_short, last_long) = latest;

    if prev_short <= prev_long && last_short > last_long {
        Some(Signal {
            name: SignalKind::GoldenCross,
            sentiment: Sentiment::Bullish,
            description: "Strong bullish signal: 50-day SMA crossed above 200-day SMA.".to_string(),
        })
    } else if prev_short >= prev_long && last_short < last_long {
        Some(Signal {
            name: SignalKind::DeathCross,
            sentiment: Sentiment::Bearish,
            description: "Strong bearish signal: 50-day SMA crossed below 200-day SMA.".to_string(),
        })
    } else {
        None
    }
}

/// Trend classification; first matching rule wins.
///
/// Every rule except the fallback needs SMA(200), so a short series is Neutral.
pub fn classify_trend(close: f64, sma_50: f64, sma_200: Option<f64>) -> Trend {
    let Some(sma_200) = sma_200 else {
        return Trend::Neutral;
    };

    if close > sma_50 && sma_50 > sma_200 {
        Trend::StrongUptrend
    } else if close < sma_50 && sma_50 < sma_200 {
        Trend::StrongDowntrend
    } else if close > sma_50 && close > sma_200 {
        Trend::Uptrend
    } else if close < sma_50 && close < sma_200 {
        Trend::Downtrend
    } else {
        Trend::Neutral
    }
}

fn defined(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
