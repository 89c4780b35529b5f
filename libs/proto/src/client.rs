//! HTTP client for a replica endpoint.
//!
//! Every call is bounded by the client's request timeout. Failures are
//! returned as [`ClientError`] so callers can decide how to classify them;
//! nothing here retries.

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::messages::{
    CpuParams, HealthCheckResponse, InterferenceAddResponse, InterferenceRemoveResponse,
    LoadParams, ThroughputResponse,
};
use crate::problem::ProblemDetails;
use crate::routes;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Replica client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// The request did not complete within the timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection-level failure.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The replica answered with a non-success status.
    #[error("{url} returned {status}: {detail}")]
    Status {
        url: String,
        status: u16,
        code: Option<String>,
        detail: String,
    },

    /// The response body did not match the expected payload.
    #[error("invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }

    /// HTTP status for [`ClientError::Status`].
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Problem code reported by the replica, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    fn from_send(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                url: url.to_string(),
            }
        } else {
            ClientError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }

    fn from_body(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                url: url.to_string(),
            }
        } else {
            ClientError::Decode {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Typed client for one replica endpoint.
#[derive(Debug, Clone)]
pub struct ReplicaClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReplicaClient {
    /// Create a client for `address` (`host:port` or a full `http://` URL).
    pub fn new(address: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self::with_client(client, address))
    }

    /// Create a client sharing an existing connection pool.
    pub fn with_client(client: reqwest::Client, address: &str) -> Self {
        Self {
            client,
            base_url: base_url(address),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask whether the replica survives `load`.
    pub async fn health(&self, load: u64) -> Result<HealthCheckResponse, ClientError> {
        let url = format!("{}{}", self.base_url, routes::HEALTH);
        let request = self.client.get(&url).query(&LoadParams { load });
        self.send(request, &url).await
    }

    /// Ask for the throughput achieved under `load`.
    pub async fn throughput(&self, load: u64) -> Result<ThroughputResponse, ClientError> {
        let url = format!("{}{}", self.base_url, routes::THROUGHPUT);
        let request = self.client.get(&url).query(&LoadParams { load });
        self.send(request, &url).await
    }

    /// Steal `cpu` points from the replica.
    pub async fn add_interference(&self, cpu: u64) -> Result<InterferenceAddResponse, ClientError> {
        let url = format!("{}{}", self.base_url, routes::NEIGHBORS_ADD);
        let request = self.client.post(&url).query(&CpuParams { cpu });
        self.send(request, &url).await
    }

    /// Restore `cpu` points to the replica.
    pub async fn remove_interference(
        &self,
        cpu: u64,
    ) -> Result<InterferenceRemoveResponse, ClientError> {
        let url = format!("{}{}", self.base_url, routes::NEIGHBORS_REMOVE);
        let request = self.client.post(&url).query(&CpuParams { cpu });
        self.send(request, &url).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::from_send(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, detail) = match serde_json::from_str::<ProblemDetails>(&body) {
                Ok(problem) => (Some(problem.code), problem.detail),
                Err(_) => (None, body),
            };
            debug!(url = %url, status = %status, detail = %detail, "Replica request rejected");
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                code,
                detail,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::from_body(url, e))
    }
}

fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(base_url("localhost:1234"), "http://localhost:1234");
        assert_eq!(base_url("http://10.0.0.1:80/"), "http://10.0.0.1:80");
        assert_eq!(base_url(" https://replica.test "), "https://replica.test");
    }

    #[tokio::test]
    async fn test_health_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .and(query_param("load", "300"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"alive": true, "available_cpu": "100"})),
            )
            .mount(&server)
            .await;

        let client = ReplicaClient::new(&server.uri(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let health = client.health(300).await.unwrap();

        assert!(health.alive);
        assert_eq!(health.available_cpu, "100");
    }

    #[tokio::test]
    async fn test_problem_response_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/neighbors/remove"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "type": "https://noisy.dev/problems/over_removal",
                "title": "Conflict",
                "status": 409,
                "detail": "cannot restore 20 CPU points: only 10 are stolen",
                "code": "over_removal"
            })))
            .mount(&server)
            .await;

        let client = ReplicaClient::new(&server.uri(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let err = client.remove_interference(20).await.unwrap_err();

        assert_eq!(err.status(), Some(409));
        assert_eq!(err.code(), Some("over_removal"));
    }

    #[tokio::test]
    async fn test_slow_replica_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/throughput"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"throughput": 10}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = ReplicaClient::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.throughput(10).await.unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics/throughput"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ReplicaClient::new(&server.uri(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let err = client.throughput(10).await.unwrap_err();

        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ReplicaClient::new(&addr.to_string(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let err = client.health(1).await.unwrap_err();

        assert!(matches!(err, ClientError::Transport { .. }));
    }
}
