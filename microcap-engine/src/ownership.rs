//! Institutional ownership analysis.
//!
//! Aggregates 13F holding records into a top-holder list and a
//! concentration metric (share of total reported value held by the named
//! holders among the ten largest positions).

use serde::{Deserialize, Serialize};

use crate::data::HoldingRecord;

/// Maximum number of holders reported.
pub const TOP_HOLDERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopHolder {
    pub name: String,
    pub value_held: f64,
    pub change_in_shares: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnershipSummary {
    /// Largest holders by value, descending
    pub top_holders: Vec<TopHolder>,
    /// Percentage of total value held by the listed holders
    pub concentration_pct: f64,
}

/// Summarize holdings. Empty input yields an empty summary with 0% concentration.
///
/// Only the ten largest records by value are considered for `top_holders`,
/// and records without a name or with a non-positive value are dropped from
/// that list. Concentration is the listed holders' value over the value of
/// every record.
pub fn analyze_ownership(holdings: &[HoldingRecord]) -> OwnershipSummary {
    if holdings.is_empty() {
        return OwnershipSummary::default();
    }

    let mut sorted: Vec<&HoldingRecord> = holdings.iter().collect();
    sorted.sort_by(|a, b| b.value_or_zero().total_cmp(&a.value_or_zero()));

    let top_holders: Vec<TopHolder> = sorted
        .iter()
        .take(TOP_HOLDERS)
        .filter_map(|h| {
            let name = h.entity_name.as_deref().filter(|n| !n.trim().is_empty())?;
            let value = h.value_or_zero();
            (value > 0.0).then(|| TopHolder {
                name: name.to_string(),
                value_held: value,
                change_in_shares: h.change_in_shares,
            })
        })
        .collect();

    let total: f64 = holdings.iter().map(HoldingRecord::value_or_zero).sum();
    let listed: f64 = top_holders.iter().map(|h| h.value_held).sum();

    let concentration_pct = if total > 0.0 {
        listed / total * 100.0
    } else {
        0.0
    };

    OwnershipSummary {
        top_holders,
        concentration_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_holdings() {
        let summary = analyze_ownership(&[]);
        assert!(summary.top_holders.is_empty());
        assert_eq!(summary.concentration_pct, 0.0);
    }

    #[test]
    fn test_sorted_descending() {
        let summary = analyze_ownership(&[
            HoldingRecord::new("Small Fund", 100.0, 5.0),
            HoldingRecord::new("Big Fund", 900.0, -10.0),
            HoldingRecord::new("Mid Fund", 500.0, 0.0),
        ]);

        let names: Vec<&str> = summary.top_holders.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Big Fund", "Mid Fund", "Small Fund"]);
        assert!((summary.concentration_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_concentration_of_top_ten() {
        let mut holdings: Vec<HoldingRecord> = (0..10)
            .map(|i| HoldingRecord::new(&format!("Fund {i}"), 100.0, 0.0))
            .collect();
        holdings.extend((0..5).map(|i| HoldingRecord::new(&format!("Tail {i}"), 50.0, 0.0)));

        let summary = analyze_ownership(&holdings);
        assert_eq!(summary.top_holders.len(), 10);
        // 1000 / 1250
        assert!((summary.concentration_pct - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_value_excluded_from_list() {
        let summary = analyze_ownership(&[
            HoldingRecord::new("Real Fund", 400.0, 1.0),
            HoldingRecord::new("Closed Position", 0.0, -50.0),
        ]);

        assert_eq!(summary.top_holders.len(), 1);
        assert_eq!(summary.top_holders[0].name, "Real Fund");
        assert!((summary.concentration_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_unnamed_record_counted_in_total() {
        let summary = analyze_ownership(&[
            HoldingRecord::new("Named", 300.0, 0.0),
            HoldingRecord {
                entity_name: None,
                market_value: Some(100.0),
                change_in_shares: None,
            },
        ]);

        assert_eq!(summary.top_holders.len(), 1);
        // 300 listed out of 400 reported
        assert!((summary.concentration_pct - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_unnamed_largest_record_not_in_numerator() {
        let summary = analyze_ownership(&[
            HoldingRecord {
                entity_name: None,
                market_value: Some(500.0),
                change_in_shares: None,
            },
            HoldingRecord::new("Named", 500.0, 0.0),
        ]);

        assert_eq!(summary.top_holders.len(), 1);
        assert_eq!(summary.top_holders[0].name, "Named");
        assert!((summary.concentration_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_unnamed_record_takes_a_top_ten_slot() {
        let mut holdings = vec![HoldingRecord {
            entity_name: Some("  ".into()),
            market_value: Some(1_000.0),
            change_in_shares: None,
        }];
        holdings.extend((0..10).map(|i| HoldingRecord::new(&format!("Fund {i}"), 100.0, 0.0)));

        let summary = analyze_ownership(&holdings);
        // Nine named funds remain among the ten largest
        assert_eq!(summary.top_holders.len(), 9);
        // 900 / 2000
        assert!((summary.concentration_pct - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_values() {
        let summary = analyze_ownership(&[HoldingRecord::new("Nothing", 0.0, 0.0)]);
        assert!(summary.top_holders.is_empty());
        assert_eq!(summary.concentration_pct, 0.0);
    }
}
