//! HTTP API handlers and routing.

mod health;
mod neighbors;
mod throughput;

use axum::{extract::rejection::QueryRejection, extract::Query, Router};
use noisy_proto::ApiError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the replica router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(throughput::routes())
        .merge(neighbors::routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found("route_not_found", "No such route.")
}

/// Turn a query extraction failure into a parameter error.
fn query_param<T>(query: Result<Query<T>, QueryRejection>, name: &str) -> Result<T, ApiError> {
    match query {
        Ok(Query(params)) => Ok(params),
        Err(rejection) => Err(ApiError::bad_request(
            "invalid_parameter",
            format!(
                "Error parsing {name} param: {}",
                rejection.body_text()
            ),
        )),
    }
}
