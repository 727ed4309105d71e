//! API route definitions
//!
//! - /health - liveness and component summary
//! - /api/v1/stats - pipeline counters and store totals
//! - /api/v1/predictions/recent - newest prediction records
//! - /api/v1/sensors/:id - one sensor record

use axum::{routing::get, Router};

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/stats", get(handlers::stats))
        .route("/predictions/recent", get(handlers::recent_predictions))
        .route("/sensors/:id", get(handlers::sensor_record))
        .with_state(state)
}

/// Root-level health endpoint
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
}
