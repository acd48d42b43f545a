//! Configuration management for the MicroCap engine.
//!
//! The engine reads a single configuration file at `~/.microcap/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (`MICROCAP_*` prefix, provider API keys)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `MICROCAP_BIND_ADDRESS` → network.bind
//! - `MICROCAP_PORT` → network.port
//! - `MICROCAP_LOG_LEVEL` → observability.log_level
//! - `MICROCAP_LOG_FORMAT` → observability.log_format
//! - `MICROCAP_ALERTS_DB` → alerts.database_path
//! - `MICROCAP_MARKET_DB` → heatmap.database_path
//! - `POLYGON_API_KEY` → secrets.polygon_api_key
//! - `TIINGO_API_KEY` → secrets.tiingo_api_key
//! - `PUSH_GATEWAY_URL` → push.endpoint (also enables push)
//! - `PUSH_GATEWAY_TOKEN` → secrets.push_gateway_token

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".microcap"),
        |dirs| dirs.home_dir().join(".microcap"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5001
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets forced to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Secrets Configuration
// ============================================================================

/// Credentials for external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Polygon.io API key (prices, OHLCV)
    #[serde(default)]
    pub polygon_api_key: Option<String>,

    /// Tiingo API key (institutional ownership)
    #[serde(default)]
    pub tiingo_api_key: Option<String>,

    /// Bearer token for the push gateway
    #[serde(default)]
    pub push_gateway_token: Option<String>,
}

// ============================================================================
// Market Data Configuration
// ============================================================================

/// Market data provider endpoints and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_polygon_base_url")]
    pub polygon_base_url: String,

    #[serde(default = "default_tiingo_base_url")]
    pub tiingo_base_url: String,

    /// Per-request timeout for provider calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of daily bars requested when assembling an analysis hub
    #[serde(default = "default_history_lookback")]
    pub history_lookback: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            polygon_base_url: default_polygon_base_url(),
            tiingo_base_url: default_tiingo_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            history_lookback: default_history_lookback(),
        }
    }
}

fn default_polygon_base_url() -> String {
    "https://api.polygon.io".into()
}

fn default_tiingo_base_url() -> String {
    "https://api.tiingo.com".into()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_history_lookback() -> usize {
    300
}

// ============================================================================
// Screener Configuration
// ============================================================================

/// Hard eligibility thresholds for the universe screener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Minimum market capitalisation, in millions of dollars
    #[serde(default = "default_min_market_cap")]
    pub min_market_cap: f64,

    /// Minimum daily volume
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,

    /// Minimum return on invested capital (fraction, 0.10 = 10%)
    #[serde(default = "default_min_roic")]
    pub min_roic: f64,

    /// Number of ranked candidates handed to curation
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            min_market_cap: default_min_market_cap(),
            min_liquidity: default_min_liquidity(),
            min_roic: default_min_roic(),
            top_k: default_top_k(),
        }
    }
}

fn default_min_market_cap() -> f64 {
    50.0
}

fn default_min_liquidity() -> f64 {
    100_000.0
}

fn default_min_roic() -> f64 {
    0.10
}

fn default_top_k() -> usize {
    10
}

// ============================================================================
// Alert Monitoring Configuration
// ============================================================================

/// Price alert monitoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Whether the monitoring scheduler runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (with seconds field, evaluated in UTC).
    ///
    /// The default fires every minute between 13:00 and 21:59 UTC on
    /// weekdays, i.e. 9:00-17:59 US Eastern during daylight time.
    #[serde(default = "default_alert_cron")]
    pub schedule_cron: String,

    /// Timeout for the batched current-price fetch
    #[serde(default = "default_price_timeout_secs")]
    pub price_timeout_secs: u64,

    /// SQLite database holding alerts and device registrations
    #[serde(default = "default_alerts_db")]
    pub database_path: PathBuf,

    /// Consecutive failed cycles before an operator-level error is logged
    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: u32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule_cron: default_alert_cron(),
            price_timeout_secs: default_price_timeout_secs(),
            database_path: default_alerts_db(),
            failure_alert_threshold: default_failure_alert_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_alert_cron() -> String {
    "0 * 13-21 * * Mon-Fri".into()
}

fn default_price_timeout_secs() -> u64 {
    10
}

fn default_alerts_db() -> PathBuf {
    config_dir().join("alerts.db")
}

fn default_failure_alert_threshold() -> u32 {
    5
}

// ============================================================================
// Sector Heatmap Configuration
// ============================================================================

/// Daily sector heatmap refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (with seconds field, evaluated in UTC).
    ///
    /// The default fires at 22:00 UTC on weekdays, after the US close.
    #[serde(default = "default_heatmap_cron")]
    pub schedule_cron: String,

    /// SQLite database holding the cached sector performance
    #[serde(default = "default_market_db")]
    pub database_path: PathBuf,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule_cron: default_heatmap_cron(),
            database_path: default_market_db(),
        }
    }
}

fn default_heatmap_cron() -> String {
    "0 0 22 * * Mon-Fri".into()
}

fn default_market_db() -> PathBuf {
    config_dir().join("market.db")
}

// ============================================================================
// Push Notification Configuration
// ============================================================================

/// Push gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Send real pushes. When false, pushes are logged only.
    #[serde(default)]
    pub enabled: bool,

    /// Push gateway endpoint (accepts APNs-shaped JSON payloads)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// APNs topic (app bundle id)
    #[serde(default = "default_push_topic")]
    pub topic: String,

    /// Route through the APNs sandbox
    #[serde(default)]
    pub sandbox: bool,

    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            topic: default_push_topic(),
            sandbox: false,
            timeout_secs: default_push_timeout_secs(),
        }
    }
}

fn default_push_topic() -> String {
    "com.microcapdaily.app".into()
}

fn default_push_timeout_secs() -> u64 {
    10
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub market_data: MarketDataConfig,

    #[serde(default)]
    pub screener: ScreenerConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    #[serde(default)]
    pub heatmap: HeatmapConfig,

    #[serde(default)]
    pub push: PushConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("MICROCAP_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("MICROCAP_PORT") {
            match port.parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid MICROCAP_PORT"),
            }
        }

        if let Some(level) = lookup("MICROCAP_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("MICROCAP_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(path) = lookup("MICROCAP_ALERTS_DB") {
            self.alerts.database_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("MICROCAP_MARKET_DB") {
            self.heatmap.database_path = PathBuf::from(path);
        }

        if let Some(key) = lookup("POLYGON_API_KEY") {
            self.secrets.polygon_api_key = Some(key);
        }
        if let Some(key) = lookup("TIINGO_API_KEY") {
            self.secrets.tiingo_api_key = Some(key);
        }

        if let Some(url) = lookup("PUSH_GATEWAY_URL") {
            self.push.endpoint = Some(url);
            self.push.enabled = true;
        }
        if let Some(token) = lookup("PUSH_GATEWAY_TOKEN") {
            self.secrets.push_gateway_token = Some(token);
        }
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.port, 5001);
        assert!((config.screener.min_market_cap - 50.0).abs() < f64::EPSILON);
        assert!((config.screener.min_liquidity - 100_000.0).abs() < f64::EPSILON);
        assert!((config.screener.min_roic - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.screener.top_k, 10);
        assert_eq!(config.alerts.price_timeout_secs, 10);
        assert!(config.heatmap.enabled);
        assert_eq!(config.heatmap.schedule_cron, "0 0 22 * * Mon-Fri");
        assert!(!config.push.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "screener": {{ "min_roic": 0.15 }}, "observability": {{ "level": "debug" }} }}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!((config.screener.min_roic - 0.15).abs() < f64::EPSILON);
        assert_eq!(config.screener.top_k, 10);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.alerts.schedule_cron, "0 * 13-21 * * Mon-Fri");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MICROCAP_PORT", "8080"),
            ("MICROCAP_LOG_FORMAT", "json"),
            ("POLYGON_API_KEY", "pk"),
            ("PUSH_GATEWAY_URL", "https://push.example.com/send"),
            ("MICROCAP_ALERTS_DB", "/tmp/alerts.db"),
            ("MICROCAP_MARKET_DB", "/tmp/market.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.network.port, 8080);
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.secrets.polygon_api_key.as_deref(), Some("pk"));
        assert!(config.push.enabled);
        assert_eq!(config.alerts.database_path, PathBuf::from("/tmp/alerts.db"));
        assert_eq!(config.heatmap.database_path, PathBuf::from("/tmp/market.db"));
        assert_eq!(config.listen_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_invalid_port_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| (key == "MICROCAP_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.network.port, 5001);
    }
}
