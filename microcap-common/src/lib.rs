//! MicroCap Common - Shared configuration, errors and logging for the MicroCap Daily engine.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.microcap/config.json` + env overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AlertsConfig, Config, HeatmapConfig, MarketDataConfig, NetworkConfig, ObservabilityConfig,
    PushConfig, ScreenerConfig, SecretsConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
