//! Health check endpoints.
//!
//! `/healthz` answers whether the replica would survive a given load, which
//! is what the controller's health phase asks. `/livez` only reports that
//! the process is up.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use noisy_proto::{routes, ApiError, HealthCheckResponse, LoadParams};
use serde::Serialize;
use tracing::debug;

use super::query_param;
use crate::state::AppState;

/// Process liveness response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct LivenessResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
}

/// Create health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(routes::HEALTH, get(healthz))
        .route(routes::LIVEZ, get(livez))
}

/// Load-aware liveness check.
async fn healthz(
    State(state): State<AppState>,
    query: Result<Query<LoadParams>, QueryRejection>,
) -> Result<Json<HealthCheckResponse>, ApiError> {
    let LoadParams { load } = query_param(query, "load")?;

    let replica = state.replica();
    let alive = replica.is_alive(load);
    let available_cpu = replica.snapshot().available_cpu_percent();
    debug!(load, alive, available_cpu = %available_cpu, "Health check");

    Ok(Json(HealthCheckResponse {
        alive,
        available_cpu,
    }))
}

async fn livez() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok".to_string(),
        service: "replica".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
