//! Composite ranking of screened instruments.
//!
//! Each factor is converted to a percentile rank within the screened set so
//! that factors with very different scales can be blended:
//!
//! | Factor | Better | Weight |
//! |--------|--------|--------|
//! | PE ratio (value) | lower | 0.40 |
//! | ROIC (quality) | higher | 0.40 |
//! | Insider ownership (alignment) | higher | 0.20 |
//!
//! Percentiles use the average-rank convention for ties and are oriented so
//! that the best instrument on a factor gets 1.0.

use serde::{Deserialize, Serialize};

use super::Instrument;

/// An instrument annotated with its factor percentiles and composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedInstrument {
    #[serde(flatten)]
    pub instrument: Instrument,
    pub value_percentile: f64,
    pub quality_percentile: f64,
    pub alignment_percentile: f64,
    pub composite_score: f64,
}

/// Factor weights for the composite score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeRanker {
    pub value_weight: f64,
    pub quality_weight: f64,
    pub alignment_weight: f64,
}

impl Default for CompositeRanker {
    fn default() -> Self {
        Self {
            value_weight: 0.40,
            quality_weight: 0.40,
            alignment_weight: 0.20,
        }
    }
}

impl CompositeRanker {
    /// Annotate and order the set, highest composite first.
    ///
    /// Equal composites keep their input order.
    pub fn rank(&self, instruments: &[Instrument]) -> Vec<RankedInstrument> {
        if instruments.is_empty() {
            return Vec::new();
        }

        // Negate PE so that the cheapest instrument ranks highest
        let value: Vec<f64> = instruments.iter().map(|i| -i.pe_ratio).collect();
        let quality: Vec<f64> = instruments.iter().map(|i| i.roic).collect();
        let alignment: Vec<f64> = instruments.iter().map(|i| i.insider_ownership_fraction).collect();

        let value_pct = percentile_ranks(&value);
        let quality_pct = percentile_ranks(&quality);
        let alignment_pct = percentile_ranks(&alignment);

        let mut ranked: Vec<RankedInstrument> = instruments
            .iter()
            .enumerate()
            .map(|(idx, instrument)| {
                let composite_score = self.value_weight * value_pct[idx]
                    + self.quality_weight * quality_pct[idx]
                    + self.alignment_weight * alignment_pct[idx];

                RankedInstrument {
                    instrument: instrument.clone(),
                    value_percentile: value_pct[idx],
                    quality_percentile: quality_pct[idx],
                    alignment_percentile: alignment_pct[idx],
                    composite_score,
                }
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        ranked
    }
}

/// Percentile rank of each value within `values`, in (0, 1].
///
/// Ascending ranks starting at 1, tied values share the average of the ranks
/// they span, divided by the number of values.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }

        // positions start..end hold ranks start+1 ..= end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = average_rank / n as f64;
        }
        start = end;
    }

    ranks
}
