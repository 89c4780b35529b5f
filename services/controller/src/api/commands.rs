//! Command endpoints.
//!
//! Each request is turned into a typed command for the controller task and
//! answered once the controller has applied it.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use noisy_proto::ApiError;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::json_body;
use crate::provision::ServiceSpec;
use crate::state::AppState;

/// Request to replace the total load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetLoadRequest {
    pub load: u64,
}

/// Request to register a running replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddReplicaRequest {
    pub address: String,
}

/// Address of a newly registered replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaAddedResponse {
    pub address: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/load", put(set_load))
        .route("/replicas", post(add_replica))
        .route("/services", post(add_service))
}

async fn set_load(
    State(state): State<AppState>,
    body: Result<Json<SetLoadRequest>, JsonRejection>,
) -> Result<Json<SetLoadRequest>, ApiError> {
    let request = json_body(body)?;
    state.controller().set_load(request.load).await?;
    Ok(Json(request))
}

async fn add_replica(
    State(state): State<AppState>,
    body: Result<Json<AddReplicaRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReplicaAddedResponse>), ApiError> {
    let request = json_body(body)?;
    let address = request.address.trim().to_string();
    if address.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_address",
            "address must not be empty",
        ));
    }

    state.controller().add_replica(address.clone()).await?;
    info!(address = %address, "Replica added via admin API");

    Ok((StatusCode::CREATED, Json(ReplicaAddedResponse { address })))
}

async fn add_service(
    State(state): State<AppState>,
    body: Result<Json<ServiceSpec>, JsonRejection>,
) -> Result<(StatusCode, Json<ReplicaAddedResponse>), ApiError> {
    let spec = json_body(body)?;
    let address = state.controller().add_service(spec).await?;
    info!(address = %address, "Service provisioned via admin API");

    Ok((StatusCode::CREATED, Json(ReplicaAddedResponse { address })))
}
