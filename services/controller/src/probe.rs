//! Replica probes.
//!
//! The tick loop asks two questions of every replica it assigns load to:
//! would you survive this load, and how much would you serve. [`ReplicaProbe`]
//! abstracts where the answers come from so ticks can be driven against real
//! endpoints or against scripted mocks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use noisy_proto::{ClientError, ReplicaClient};
use thiserror::Error;

/// Why a probe produced no answer.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The replica endpoint could not be reached or answered badly.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The probe did not answer within the per-call timeout.
    #[error("probe of {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    /// A scripted probe configured to be unreachable.
    #[error("replica {address} is unreachable")]
    Unreachable { address: String },
}

/// Source of health and throughput answers for one replica.
#[async_trait]
pub trait ReplicaProbe: Send + Sync {
    /// Address the replica is registered under.
    fn address(&self) -> &str;

    /// Whether the replica survives `load`.
    async fn health(&self, load: u64) -> Result<bool, ProbeError>;

    /// Throughput the replica achieves under `load`.
    async fn throughput(&self, load: u64) -> Result<u64, ProbeError>;
}

/// Creates probes for newly registered addresses.
pub trait Connector: Send + Sync {
    fn connect(&self, address: &str) -> Arc<dyn ReplicaProbe>;
}

/// Probe backed by a replica's HTTP endpoint.
pub struct HttpProbe {
    address: String,
    client: ReplicaClient,
}

impl HttpProbe {
    pub fn new(address: &str, client: reqwest::Client) -> Self {
        Self {
            address: address.to_string(),
            client: ReplicaClient::with_client(client, address),
        }
    }
}

#[async_trait]
impl ReplicaProbe for HttpProbe {
    fn address(&self) -> &str {
        &self.address
    }

    async fn health(&self, load: u64) -> Result<bool, ProbeError> {
        Ok(self.client.health(load).await?.alive)
    }

    async fn throughput(&self, load: u64) -> Result<u64, ProbeError> {
        Ok(self.client.throughput(load).await?.throughput)
    }
}

/// Connector handing out [`HttpProbe`]s that share one connection pool.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    /// Build a connector whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self { client })
    }
}

impl Connector for HttpConnector {
    fn connect(&self, address: &str) -> Arc<dyn ReplicaProbe> {
        Arc::new(HttpProbe::new(address, self.client.clone()))
    }
}

/// Scripted probe for tests and dry runs.
///
/// Starts alive, reachable and serving whatever load it is offered.
pub struct MockProbe {
    address: String,
    alive: AtomicBool,
    reachable: AtomicBool,
    /// Fixed throughput; `u64::MAX` echoes the offered load.
    throughput: AtomicU64,
    health_calls: AtomicU64,
    throughput_calls: AtomicU64,
    last_load: AtomicU64,
}

impl MockProbe {
    const ECHO_LOAD: u64 = u64::MAX;

    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            alive: AtomicBool::new(true),
            reachable: AtomicBool::new(true),
            throughput: AtomicU64::new(Self::ECHO_LOAD),
            health_calls: AtomicU64::new(0),
            throughput_calls: AtomicU64::new(0),
            last_load: AtomicU64::new(0),
        }
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Report a fixed throughput regardless of load.
    pub fn set_throughput(&self, throughput: u64) {
        self.throughput.store(throughput, Ordering::SeqCst);
    }

    /// Go back to serving the full offered load.
    pub fn echo_load(&self) {
        self.throughput.store(Self::ECHO_LOAD, Ordering::SeqCst);
    }

    pub fn health_calls(&self) -> u64 {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn throughput_calls(&self) -> u64 {
        self.throughput_calls.load(Ordering::SeqCst)
    }

    /// Load offered by the most recent probe of either kind.
    pub fn last_load(&self) -> u64 {
        self.last_load.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), ProbeError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Unreachable {
                address: self.address.clone(),
            })
        }
    }
}

#[async_trait]
impl ReplicaProbe for MockProbe {
    fn address(&self) -> &str {
        &self.address
    }

    async fn health(&self, load: u64) -> Result<bool, ProbeError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.last_load.store(load, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.alive.load(Ordering::SeqCst))
    }

    async fn throughput(&self, load: u64) -> Result<u64, ProbeError> {
        self.throughput_calls.fetch_add(1, Ordering::SeqCst);
        self.last_load.store(load, Ordering::SeqCst);
        self.check_reachable()?;
        match self.throughput.load(Ordering::SeqCst) {
            Self::ECHO_LOAD => Ok(load),
            fixed => Ok(fixed),
        }
    }
}

/// Connector that creates (or reuses) one [`MockProbe`] per address.
#[derive(Default)]
pub struct MockConnector {
    probes: Mutex<BTreeMap<String, Arc<MockProbe>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The probe for `address`, created on first use.
    pub fn probe(&self, address: &str) -> Arc<MockProbe> {
        let mut probes = match self.probes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        probes
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(MockProbe::new(address)))
            .clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, address: &str) -> Arc<dyn ReplicaProbe> {
        self.probe(address)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_mock_probe_defaults_to_echo() {
        let probe = MockProbe::new("a");

        assert!(probe.health(300).await.unwrap());
        assert_eq!(probe.throughput(300).await.unwrap(), 300);
        assert_eq!(probe.health_calls(), 1);
        assert_eq!(probe.throughput_calls(), 1);
        assert_eq!(probe.last_load(), 300);
    }

    #[tokio::test]
    async fn test_mock_probe_scripting() {
        let probe = MockProbe::new("a");

        probe.set_throughput(0);
        assert_eq!(probe.throughput(300).await.unwrap(), 0);

        probe.set_alive(false);
        assert!(!probe.health(300).await.unwrap());

        probe.set_reachable(false);
        assert!(matches!(
            probe.health(300).await,
            Err(ProbeError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_connector_reuses_probes() {
        let connector = MockConnector::new();
        connector.probe("a").set_alive(false);

        let probe = connector.connect("a");
        assert_eq!(probe.address(), "a");
        assert!(!probe.health(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_probe_reads_endpoint() {
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
        Mock::given(method("GET"))
            .and(path("/metrics/throughput"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"throughput": 250})))
            .mount(&server)
            .await;

        let connector = HttpConnector::new(Duration::from_secs(1)).unwrap();
        let probe = connector.connect(&server.uri());

        assert!(probe.health(300).await.unwrap());
        assert_eq!(probe.throughput(300).await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_http_probe_error_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let connector = HttpConnector::new(Duration::from_secs(1)).unwrap();
        let probe = connector.connect(&server.uri());

        assert!(matches!(
            probe.health(1).await,
            Err(ProbeError::Client(ClientError::Status { status: 500, .. }))
        ));
    }
}
