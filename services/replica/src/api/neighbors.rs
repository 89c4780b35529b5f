//! Noisy neighbor endpoints.
//!
//! A neighbor steals CPU points from the replica; the counter is shared by
//! every concurrent request, so add and remove are applied atomically by the
//! model and reported back with the value they produced.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::post,
    Json, Router,
};
use noisy_model::InterferenceError;
use noisy_proto::{
    routes, ApiError, CpuParams, InterferenceAddResponse, InterferenceRemoveResponse,
};
use tracing::{info, warn};

use super::query_param;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(routes::NEIGHBORS_ADD, post(add_neighbor))
        .route(routes::NEIGHBORS_REMOVE, post(remove_neighbor))
}

async fn add_neighbor(
    State(state): State<AppState>,
    query: Result<Query<CpuParams>, QueryRejection>,
) -> Result<Json<InterferenceAddResponse>, ApiError> {
    let CpuParams { cpu } = query_param(query, "cpu")?;

    let applied = state
        .replica()
        .add_interference(cpu)
        .map_err(interference_error)?;

    info!(
        cpu,
        previous_stolen_cpu = applied.previous_stolen_cpu,
        stolen_cpu = applied.stolen_cpu,
        "Noisy neighbor added"
    );

    Ok(Json(InterferenceAddResponse {
        previous_stolen_cpu: applied.previous_stolen_cpu,
        stolen_cpu: applied.stolen_cpu,
    }))
}

async fn remove_neighbor(
    State(state): State<AppState>,
    query: Result<Query<CpuParams>, QueryRejection>,
) -> Result<Json<InterferenceRemoveResponse>, ApiError> {
    let CpuParams { cpu } = query_param(query, "cpu")?;

    let restored = state
        .replica()
        .remove_interference(cpu)
        .map_err(interference_error)?;

    info!(
        restored_cpu = restored.restored_cpu,
        stolen_cpu = restored.stolen_cpu,
        "Noisy neighbor removed"
    );

    Ok(Json(InterferenceRemoveResponse {
        restored_cpu: restored.restored_cpu,
        stolen_cpu: restored.stolen_cpu,
    }))
}

fn interference_error(err: InterferenceError) -> ApiError {
    warn!(error = %err, "Interference change rejected");
    match err {
        InterferenceError::OverRemoval { .. } => ApiError::conflict("over_removal", err.to_string()),
        InterferenceError::Overflow { .. } => {
            ApiError::conflict("stolen_cpu_overflow", err.to_string())
        }
    }
}
