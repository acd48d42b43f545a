//! Price alert monitoring.
//!
//! User-defined price thresholds are stored in an `AlertStore` and checked
//! on a cron cadence by a `CronScheduler`, which drives
//! `AlertMonitor::run_monitoring_cycle`.
//!
//! # Alert lifecycle
//!
//! ```text
//! create ──▶ Active ──(price crosses target)──▶ Triggered (terminal)
//! ```
//!
//! A triggered alert is persisted with `is_active = false` and never
//! reactivated.

pub mod monitor;
pub mod store;

pub use monitor::{AlertMonitor, CycleError, CycleOutcome, CycleStatus};
pub use store::{AlertStore, SqliteAlertStore, StoreError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of the target price fires the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertDirection {
    Above,
    Below,
}

impl AlertDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }

    /// Both directions are inclusive: a price equal to the target fires.
    pub fn is_triggered(&self, target_price: f64, current_price: f64) -> bool {
        match self {
            Self::Above => current_price >= target_price,
            Self::Below => current_price <= target_price,
        }
    }
}

impl std::str::FromStr for AlertDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "above" => Ok(Self::Above),
            "below" => Ok(Self::Below),
            other => Err(format!("unknown alert direction: {other}")),
        }
    }
}

impl std::fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted price threshold owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: i64,
    pub owner_id: String,
    pub ticker: String,
    pub target_price: f64,
    pub direction: AlertDirection,
    pub is_active: bool,
}

impl PriceAlert {
    /// Notification title and body for this alert firing at `current_price`.
    pub fn notification_text(&self, current_price: f64) -> (String, String) {
        let title = format!("Price Alert: {}", self.ticker);
        let verb = match self.direction {
            AlertDirection::Above => "risen to or above",
            AlertDirection::Below => "fallen to or below",
        };
        let body = format!(
            "{} has {} your target of ${:.2}. Current price: ${:.2}.",
            self.ticker, verb, self.target_price, current_price
        );
        (title, body)
    }
}

/// Request to create an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub owner_id: String,
    pub ticker: String,
    pub target_price: f64,
    pub direction: AlertDirection,
}

/// A push token registered for a user's device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub owner_id: String,
    pub token: String,
    pub last_registered: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_inclusive() {
        assert!(AlertDirection::Above.is_triggered(100.0, 100.0));
        assert!(AlertDirection::Above.is_triggered(100.0, 100.5));
        assert!(!AlertDirection::Above.is_triggered(100.0, 99.99));

        assert!(AlertDirection::Below.is_triggered(100.0, 100.0));
        assert!(AlertDirection::Below.is_triggered(100.0, 80.0));
        assert!(!AlertDirection::Below.is_triggered(100.0, 100.01));
    }

    #[test]
    fn test_direction_parse_and_serde() {
        assert_eq!("ABOVE".parse::<AlertDirection>().unwrap(), AlertDirection::Above);
        assert!("sideways".parse::<AlertDirection>().is_err());
        assert_eq!(serde_json::to_string(&AlertDirection::Below).unwrap(), "\"below\"");
    }

    #[test]
    fn test_notification_text() {
        let alert = PriceAlert {
            id: 1,
            owner_id: "user-1".into(),
            ticker: "ACME".into(),
            target_price: 12.5,
            direction: AlertDirection::Above,
            is_active: true,
        };

        let (title, body) = alert.notification_text(12.75);
        assert_eq!(title, "Price Alert: ACME");
        assert!(body.contains("$12.50"));
        assert!(body.contains("$12.75"));
    }
}
