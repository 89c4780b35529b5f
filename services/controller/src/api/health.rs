//! Liveness endpoint.

use axum::{routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Process liveness response.
#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route(noisy_proto::routes::LIVEZ, get(livez))
}

async fn livez() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok".to_string(),
        service: "controller".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
