//! Configuration validation for the MicroCap engine.
//!
//! Validates configuration fields so the service fails at startup
//! rather than mid-cycle.

use std::str::FromStr;
use thiserror::Error;

use crate::config::{
    AlertsConfig, Config, HeatmapConfig, ObservabilityConfig, PushConfig, ScreenerConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.network.port == 0 {
            errors.push(ValidationError::InvalidPort {
                port: 0,
                field: "network.port".into(),
            });
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if let Err(e) = self.screener.validate() {
            errors.push(e);
        }

        if let Err(e) = self.alerts.validate() {
            errors.push(e);
        }

        if let Err(e) = self.heatmap.validate() {
            errors.push(e);
        }

        if let Err(e) = self.push.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load, apply environment overrides, and validate configuration.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let thresholds = [
            ("screener.min_market_cap", self.min_market_cap),
            ("screener.min_liquidity", self.min_liquidity),
            ("screener.min_roic", self.min_roic),
        ];

        for (field, value) in thresholds {
            if !value.is_finite() {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: "must be a finite number".into(),
                });
            }
        }

        if self.min_market_cap < 0.0 || self.min_liquidity < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "screener".into(),
                reason: "market cap and liquidity floors cannot be negative".into(),
            });
        }

        if self.top_k == 0 {
            return Err(ValidationError::InvalidValue {
                field: "screener.top_k".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

impl Validate for AlertsConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.schedule_cron.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "alerts.schedule_cron".into(),
            });
        }

        if let Err(e) = cron::Schedule::from_str(&self.schedule_cron) {
            return Err(ValidationError::InvalidValue {
                field: "alerts.schedule_cron".into(),
                reason: e.to_string(),
            });
        }

        if self.price_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "alerts.price_timeout_secs".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        Ok(())
    }
}

impl Validate for HeatmapConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Err(e) = cron::Schedule::from_str(&self.schedule_cron) {
            return Err(ValidationError::InvalidValue {
                field: "heatmap.schedule_cron".into(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for PushConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.enabled && self.endpoint.as_deref().map_or(true, str::is_empty) {
            return Err(ValidationError::MissingField {
                field: "push.endpoint".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "verbose".into();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_cron() {
        let mut config = Config::default();
        config.alerts.schedule_cron = "every minute".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alerts.schedule_cron"));
    }

    #[test]
    fn test_invalid_heatmap_cron() {
        let mut config = Config::default();
        config.heatmap.schedule_cron = "0 0 25 * * *".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("heatmap.schedule_cron"));
    }

    #[test]
    fn test_push_requires_endpoint() {
        let mut config = Config::default();
        config.push.enabled = true;
        assert!(matches!(
            config.push.validate(),
            Err(ValidationError::MissingField { .. })
        ));

        config.push.endpoint = Some("https://push.example.com".into());
        assert!(config.push.validate().is_ok());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.network.port = 0;
        config.screener.top_k = 0;
        config.alerts.price_timeout_secs = 0;

        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let mut config = Config::default();
        config.screener.min_roic = f64::NAN;
        assert!(config.screener.validate().is_err());
    }
}
