//! HTTP routes for the engine service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::alerts::{CycleOutcome, DeviceRegistration, NewAlert, PriceAlert, StoreError};
use crate::conviction::{synthesize_conviction, AnalystInput, Classification};
use crate::heatmap::SectorPerformance;
use crate::hub::{AnalysisHub, ExternalSections};
use crate::screener::{screen_and_rank, RankedInstrument, UniverseRow};
use crate::EngineState;

// ============================================================================
// Errors
// ============================================================================

/// Error returned by handlers, rendered as `{"success": false, "error": {...}}`.
#[derive(Debug)]
pub struct ApiError(microcap_common::Error);

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(microcap_common::Error::InvalidInput(message.into()))
    }
}

impl From<microcap_common::Error> for ApiError {
    fn from(e: microcap_common::Error) -> Self {
        Self(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match status {
            StatusCode::BAD_REQUEST => "INVALID_INPUT",
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::SERVICE_UNAVAILABLE => "STORE_UNAVAILABLE",
            StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => "UPSTREAM_ERROR",
            _ => "INTERNAL_ERROR",
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code,
                message: self.0.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct CandidatesRequest {
    pub universe: Vec<UniverseRow>,
    /// Overrides the configured queue size
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CandidatesResponse {
    /// Rows received
    pub universe_size: usize,
    /// Instruments that passed every filter
    pub screened: usize,
    pub candidates: Vec<RankedInstrument>,
}

#[derive(Debug, Deserialize)]
pub struct ConvictionRequest {
    pub ticker: String,
    #[serde(default)]
    pub thesis_strength: Option<u8>,
    #[serde(flatten)]
    pub external: ExternalSections,
}

#[derive(Debug, Serialize)]
pub struct ConvictionResponse {
    pub ticker: String,
    pub score: f64,
    pub classification: Classification,
    /// Human-readable classification
    pub label: String,
    pub hub: AnalysisHub,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<PriceAlert>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HeatmapRefreshResponse {
    /// Sectors written by this refresh
    pub updated: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeviceRequest {
    pub owner_id: String,
    pub token: String,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "microcap-engine".to_string(),
    })
}

/// Technicals and ownership for one ticker
pub async fn get_analysis_hub(
    State(state): State<Arc<EngineState>>,
    Path(ticker): Path<String>,
) -> Result<Json<AnalysisHub>, ApiError> {
    let ticker = validate_ticker(&ticker)?;
    let hub = state.hub.assemble(&ticker, ExternalSections::default()).await;
    Ok(Json(hub))
}

/// Screen a universe and return the top-ranked candidates for curation
pub async fn screener_candidates(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<CandidatesRequest>,
) -> Result<Json<CandidatesResponse>, ApiError> {
    let top_k = request.top_k.unwrap_or(state.config.screener.top_k);
    if top_k == 0 {
        return Err(ApiError::invalid("top_k must be at least 1"));
    }

    let instruments: Vec<_> = request.universe.iter().filter_map(UniverseRow::to_instrument).collect();
    let mut ranked = screen_and_rank(&state.config.screener, &instruments);
    let screened = ranked.len();
    ranked.truncate(top_k);

    Ok(Json(CandidatesResponse {
        universe_size: request.universe.len(),
        screened,
        candidates: ranked,
    }))
}

/// Conviction score for a ticker from its hub plus analyst input
pub async fn admin_conviction(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<ConvictionRequest>,
) -> Result<Json<ConvictionResponse>, ApiError> {
    let ticker = validate_ticker(&request.ticker)?;
    let input = match request.thesis_strength {
        None => AnalystInput::default(),
        Some(s @ 1..=5) => AnalystInput { thesis_strength: s },
        Some(s) => return Err(ApiError::invalid(format!("thesis_strength must be 1-5, got {s}"))),
    };

    let hub = state.hub.assemble(&ticker, request.external).await;
    let result = synthesize_conviction(&hub, &input);

    info!(
        ticker = %ticker,
        score = result.score,
        classification = %result.classification,
        "Conviction score computed"
    );

    Ok(Json(ConvictionResponse {
        ticker,
        score: result.score,
        classification: result.classification,
        label: result.classification.to_string(),
        hub,
    }))
}

/// Create a price alert
pub async fn create_alert(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<NewAlert>,
) -> Result<(StatusCode, Json<PriceAlert>), ApiError> {
    let alert = state.store.create_alert(request).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// List an owner's alerts
pub async fn list_alerts(
    State(state): State<Arc<EngineState>>,
    Path(owner_id): Path<String>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let alerts = state.store.alerts_for_owner(&owner_id).await?;
    let count = alerts.len();
    Ok(Json(AlertsResponse { alerts, count }))
}

/// Delete one of an owner's alerts
pub async fn delete_alert(
    State(state): State<Arc<EngineState>>,
    Path((owner_id, alert_id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_alert(&owner_id, alert_id).await? {
        info!(owner_id = %owner_id, alert_id, "Deleted price alert");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(microcap_common::Error::NotFound(format!("alert {alert_id} not found for {owner_id}")).into())
    }
}

/// Register or refresh a device push token
pub async fn register_device(
    State(state): State<Arc<EngineState>>,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<DeviceRegistration>, ApiError> {
    let registration = state.store.register_device(&request.owner_id, &request.token).await?;
    Ok(Json(registration))
}

/// Run one monitoring cycle now
pub async fn run_monitor(State(state): State<Arc<EngineState>>) -> Json<CycleOutcome> {
    Json(state.monitor.run_monitoring_cycle().await)
}

/// Cached sector performance, strongest first
pub async fn market_heatmap(
    State(state): State<Arc<EngineState>>,
) -> Result<Json<Vec<SectorPerformance>>, ApiError> {
    Ok(Json(state.heatmap.snapshot().await?))
}

/// Recompute the sector heatmap now
pub async fn refresh_heatmap(
    State(state): State<Arc<EngineState>>,
) -> Result<Json<HeatmapRefreshResponse>, ApiError> {
    let updated = state.heatmap.refresh().await?;
    Ok(Json(HeatmapRefreshResponse { updated }))
}

fn validate_ticker(raw: &str) -> Result<String, ApiError> {
    let ticker = raw.trim().to_ascii_uppercase();
    let valid = !ticker.is_empty()
        && ticker.len() <= 10
        && ticker.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

    if valid {
        Ok(ticker)
    } else {
        Err(ApiError::invalid(format!("invalid ticker: {raw}")))
    }
}
