//! Throughput endpoint.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::get,
    Json, Router,
};
use noisy_proto::{routes, ApiError, LoadParams, ThroughputConfigureRequest, ThroughputResponse};
use tracing::{debug, error};

use super::query_param;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        routes::THROUGHPUT,
        get(get_throughput).post(configure_throughput),
    )
}

/// Report the throughput achieved under `?load=N`.
async fn get_throughput(
    State(state): State<AppState>,
    query: Result<Query<LoadParams>, QueryRejection>,
) -> Result<Json<ThroughputResponse>, ApiError> {
    let LoadParams { load } = query_param(query, "load")?;

    let replica = state.replica();
    let band = replica.band(load);
    let throughput = replica.calculate_throughput(load);
    debug!(load, throughput, band = ?band, "Throughput query");

    Ok(Json(ThroughputResponse { throughput }))
}

/// Limits are fixed at startup; reconfiguration is refused whatever the body.
async fn configure_throughput(
    body: Result<Json<ThroughputConfigureRequest>, JsonRejection>,
) -> Result<Json<ThroughputResponse>, ApiError> {
    match body {
        Ok(Json(request)) => error!(
            max_throughput = request.max_throughput,
            soft_limit = request.soft_limit,
            hard_limit = request.hard_limit,
            "Throughput reconfiguration requested but not supported"
        ),
        Err(rejection) => error!(
            rejection = %rejection.body_text(),
            "Throughput reconfiguration requested but not supported"
        ),
    }
    Err(ApiError::not_implemented(
        "throughput_configure_unsupported",
        "Replica limits are fixed at startup.",
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use rstest::rstest;
    use tower::ServiceExt;

    use super::super::test_support::{call, router};

    #[tokio::test]
    async fn test_served_band_returns_load() {
        let (router, _) = router();
        let (status, body) = call(&router, Method::GET, "/metrics/throughput?load=300").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["throughput"], 300);
    }

    #[tokio::test]
    async fn test_saturated_band_returns_capacity() {
        let (router, _) = router();
        let (_, body) = call(&router, Method::GET, "/metrics/throughput?load=1200").await;

        assert_eq!(body["throughput"], 1000);
    }

    #[tokio::test]
    async fn test_degraded_band_stays_in_range() {
        let (router, _) = router();

        for _ in 0..20 {
            let (_, body) = call(&router, Method::GET, "/metrics/throughput?load=1800").await;
            let throughput = body["throughput"].as_u64().unwrap();
            assert!((500..750).contains(&throughput), "got {throughput}");
        }
    }

    #[tokio::test]
    async fn test_collapsed_band_returns_zero() {
        let (router, state) = router();
        state.replica().add_interference(50).unwrap();

        let (_, body) = call(&router, Method::GET, "/metrics/throughput?load=1500").await;
        assert_eq!(body["throughput"], 0);
    }

    #[tokio::test]
    async fn test_bad_load_is_rejected() {
        let (router, _) = router();
        let (status, body) = call(&router, Method::GET, "/metrics/throughput?load=-1").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_parameter");
    }

    async fn configure(
        router: &axum::Router,
        content_type: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, Option<String>, serde_json::Value) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/metrics/throughput");
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        let request = request.body(Body::from(body)).unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| value.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        (status, content_type, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_configure_is_not_implemented() {
        let (router, _) = router();
        let (status, _, body) = configure(
            &router,
            Some("application/json"),
            r#"{"max_throughput":10,"soft_limit":20,"hard_limit":30}"#,
        )
        .await;

        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["code"], "throughput_configure_unsupported");
    }

    #[rstest]
    #[case::empty_without_content_type(None, "")]
    #[case::empty_object(Some("application/json"), "{}")]
    #[case::partial_limits(Some("application/json"), r#"{"max_throughput":1}"#)]
    #[case::not_json(Some("application/json"), "limits please")]
    #[tokio::test]
    async fn test_configure_refuses_any_body(
        #[case] content_type: Option<&str>,
        #[case] body: &'static str,
    ) {
        let (router, _) = router();
        let (status, content_type, body) = configure(&router, content_type, body).await;

        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(content_type.as_deref(), Some("application/problem+json"));
        assert_eq!(body["code"], "throughput_configure_unsupported");
    }
}
