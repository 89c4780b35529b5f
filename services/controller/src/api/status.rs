//! Controller status endpoint.

use axum::{extract::State, routing::get, Json, Router};

use crate::controller::ControllerStatus;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/status", get(get_status))
}

/// Latest published controller status.
async fn get_status(State(state): State<AppState>) -> Json<ControllerStatus> {
    Json(state.controller().status())
}
