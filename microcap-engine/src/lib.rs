//! MicroCap Engine Library
//!
//! Screening, scoring and price-alert monitoring for the MicroCap Daily
//! research product.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  microcap-engine (Rust Service)                     │
//! │                           :5001                                     │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │  Universe       │  │  Technicals +   │  │  Alert          │      │
//! │  │  Screener       │  │  Ownership Hub  │  │  Monitor        │      │
//! │  └─────────────────┘  └────────┬────────┘  └────────┬────────┘      │
//! │                                │                    │               │
//! │                       ┌────────▼────────┐  ┌────────▼────────┐      │
//! │                       │ Conviction      │  │ SQLite store +  │      │
//! │                       │ Synthesizer     │  │ Push gateway    │      │
//! │                       └─────────────────┘  └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Screening funnel
//! - Hard filters: market cap, liquidity, ROIC, positive earnings
//! - Percentile ranks for value (PE), quality (ROIC), alignment (insider ownership)
//! - Composite = 0.4 value + 0.4 quality + 0.2 alignment
//!
//! ## Alert monitoring
//! - One batched price fetch per cycle
//! - Inclusive thresholds, one-shot triggers
//! - All deactivations of a cycle committed in one transaction
//!
//! ## Sector heatmap
//! - Daily change of one sector ETF per sector, cached in SQLite
//! - Refreshed after the close by its own cron scheduler

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod alerts;
pub mod conviction;
pub mod data;
pub mod heatmap;
pub mod hub;
pub mod notification;
pub mod ownership;
pub mod routes;
pub mod scheduler;
pub mod screener;
pub mod technical;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use microcap_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::alerts::{AlertMonitor, AlertStore, SqliteAlertStore};
use crate::data::{MarketDataPort, PolygonTiingoProvider};
use crate::heatmap::{HeatmapCalculator, SectorStore, SqliteSectorStore};
use crate::hub::HubAssembler;
use crate::notification::{NotificationSink, PushGatewayClient};
use crate::scheduler::{CronScheduler, ScheduledJob};

/// Request bodies above this size are rejected (universe snapshots included)
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound for any single request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Engine service state
pub struct EngineState {
    /// Configuration
    pub config: Config,
    /// Market data provider
    pub market_data: Arc<dyn MarketDataPort>,
    /// Alert persistence
    pub store: Arc<dyn AlertStore>,
    /// Per-ticker hub assembly
    pub hub: HubAssembler,
    /// Alert monitoring cycle
    pub monitor: Arc<AlertMonitor>,
    /// Sector heatmap refresh and cache
    pub heatmap: Arc<HeatmapCalculator>,
}

impl EngineState {
    /// Create state from explicit collaborators
    pub fn new(
        config: Config,
        market_data: Arc<dyn MarketDataPort>,
        store: Arc<dyn AlertStore>,
        sectors: Arc<dyn SectorStore>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let hub = HubAssembler::new(Arc::clone(&market_data), config.market_data.history_lookback);
        let monitor = Arc::new(AlertMonitor::new(
            Arc::clone(&market_data),
            Arc::clone(&store),
            notifier,
            Duration::from_secs(config.alerts.price_timeout_secs),
        ));
        let heatmap = Arc::new(HeatmapCalculator::new(Arc::clone(&market_data), sectors));

        Self {
            config,
            market_data,
            store,
            hub,
            monitor,
            heatmap,
        }
    }

    /// Create state with the production adapters described by `config`
    pub fn from_config(config: Config) -> Result<Self> {
        let market_data: Arc<dyn MarketDataPort> = Arc::new(PolygonTiingoProvider::from_config(&config));
        let store: Arc<dyn AlertStore> = Arc::new(
            SqliteAlertStore::open(&config.alerts.database_path).context("Failed to open alert store")?,
        );
        let sectors: Arc<dyn SectorStore> = Arc::new(
            SqliteSectorStore::open(&config.heatmap.database_path).context("Failed to open sector store")?,
        );
        let notifier: Arc<dyn NotificationSink> = Arc::new(PushGatewayClient::from_config(&config));

        Ok(Self::new(config, market_data, store, sectors, notifier))
    }
}

/// Build the HTTP router over `state`
pub fn build_router(state: Arc<EngineState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(routes::health))
        .route("/api/v1/analysis/hub/:ticker", get(routes::get_analysis_hub))
        .route("/api/v1/screener/candidates", post(routes::screener_candidates))
        .route("/api/v1/admin/conviction", post(routes::admin_conviction))
        // Alerts
        .route("/api/v1/alerts", post(routes::create_alert))
        .route("/api/v1/alerts/:owner_id", get(routes::list_alerts))
        .route("/api/v1/alerts/:owner_id/:id", delete(routes::delete_alert))
        .route("/api/v1/alerts/monitor/run", post(routes::run_monitor))
        .route("/api/v1/devices", post(routes::register_device))
        // Market
        .route("/api/v1/market/heatmap", get(routes::market_heatmap))
        .route("/api/v1/market/heatmap/refresh", post(routes::refresh_heatmap))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        .layer(cors)
}

/// Main engine service
pub struct EngineService {
    state: Arc<EngineState>,
}

impl EngineService {
    /// Create a new engine service with production adapters
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(EngineState::from_config(config)?);
        Ok(Self { state })
    }

    /// Create from prepared state
    pub fn with_state(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Start the background schedulers and serve HTTP until the server exits
    pub async fn start(self) -> Result<()> {
        let config = &self.state.config;
        if config.alerts.enabled {
            spawn_scheduler(CronScheduler::new(
                Arc::clone(&self.state.monitor) as Arc<dyn ScheduledJob>,
                &config.alerts.schedule_cron,
                config.alerts.failure_alert_threshold,
            )?);
        } else {
            tracing::info!("Alert monitoring disabled, scheduler not started");
        }

        if config.heatmap.enabled {
            spawn_scheduler(CronScheduler::new(
                Arc::clone(&self.state.heatmap) as Arc<dyn ScheduledJob>,
                &config.heatmap.schedule_cron,
                config.alerts.failure_alert_threshold,
            )?);
        } else {
            tracing::info!("Sector heatmap disabled, scheduler not started");
        }

        let addr: SocketAddr = self
            .state
            .config
            .listen_address()
            .parse()
            .context("Invalid listen address")?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let app = build_router(Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

fn spawn_scheduler(scheduler: CronScheduler) {
    tokio::spawn(async move {
        scheduler.run().await;
    });
}
