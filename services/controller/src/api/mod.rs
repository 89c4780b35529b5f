//! Admin API handlers and routing.

mod commands;
mod health;
mod status;

use axum::{extract::rejection::JsonRejection, Json, Router};
use noisy_proto::ApiError;
use tower_http::trace::TraceLayer;

use crate::command::CommandError;
use crate::fleet::FleetError;
use crate::provision::ProvisionError;
use crate::state::AppState;

pub use commands::{AddReplicaRequest, ReplicaAddedResponse, SetLoadRequest};

/// Create the admin router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/v1", v1_routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn v1_routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .merge(commands::routes())
}

async fn not_found() -> ApiError {
    ApiError::not_found("route_not_found", "No such route.")
}

/// Turn a JSON body extraction failure into a request error.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::bad_request(
            "invalid_body",
            rejection.body_text(),
        )),
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        let message = err.to_string();
        match err {
            CommandError::Fleet(FleetError::CapacityExhausted { .. }) => {
                ApiError::conflict("fleet_capacity_exhausted", message)
            }
            CommandError::Fleet(FleetError::AlreadyRegistered { .. }) => {
                ApiError::conflict("replica_already_registered", message)
            }
            CommandError::Provision(ProvisionError::InvalidSpec(_)) => {
                ApiError::bad_request("invalid_service_spec", message)
            }
            CommandError::Provision(_) => ApiError::bad_gateway("provisioning_failed", message),
            CommandError::Stopped => ApiError::service_unavailable("controller_stopped", message),
        }
    }
}
