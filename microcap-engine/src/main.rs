//! MicroCap Engine - screening, conviction scoring and price-alert service.

use anyhow::{Context, Result};
use microcap_common::config::Config;
use microcap_common::logging::init_logging_with_exclusions;
use microcap_engine::EngineService;

#[tokio::main]
async fn main() -> Result<()> {
    // Start timing immediately for cold-start measurement
    let startup_start = std::time::Instant::now();

    // Load configuration (file, then environment overrides)
    let config = Config::load_with_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("MicroCap Engine v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    let service = EngineService::new(config)?;

    // Log startup timing before entering main service loop
    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}
