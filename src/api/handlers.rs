//! Status endpoint handlers. All read-only.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::envelope::{ApiError, Envelope};
use crate::config::defaults::{RECENT_PREDICTIONS_LIMIT, RECENT_PREDICTIONS_MAX};
use crate::pipeline::{PipelineStats, SharedStats};
use crate::storage::{StoreCounts, TelemetryStore};
use crate::types::{PredictionRecord, RecordId, SensorRecord};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub stats: SharedStats,
    pub store: Arc<dyn TelemetryStore>,
    /// Scoring model description, for `/health`
    pub model: String,
    pub alerting_enabled: bool,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub source: String,
    pub store_backend: &'static str,
    pub model: String,
    pub alerting_enabled: bool,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let stats = state.stats.read().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: stats.uptime_secs(),
        source: stats.source.clone(),
        store_backend: state.store.backend_name(),
        model: state.model.clone(),
        alerting_enabled: state.alerting_enabled,
    })
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub pipeline: PipelineStats,
    pub store: StoreCounts,
}

/// GET /api/v1/stats
pub async fn stats(State(state): State<ApiState>) -> Envelope<StatsResponse> {
    let pipeline = state.stats.read().await.clone();
    Envelope::new(StatsResponse {
        pipeline,
        store: state.store.counts(),
    })
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/predictions/recent?limit=N
///
/// Newest first. `limit` defaults to 20 and is capped at 500.
pub async fn recent_predictions(
    State(state): State<ApiState>,
    Query(query): Query<RecentQuery>,
) -> Result<Envelope<Vec<PredictionRecord>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(RECENT_PREDICTIONS_LIMIT)
        .min(RECENT_PREDICTIONS_MAX);
    Ok(Envelope::new(state.store.recent_predictions(limit)?))
}

/// GET /api/v1/sensors/:id
pub async fn sensor_record(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Envelope<SensorRecord>, ApiError> {
    state
        .store
        .sensor_record(RecordId(id))?
        .map(Envelope::new)
        .ok_or_else(|| ApiError::NotFound(format!("sensor record {id} not found")))
}
