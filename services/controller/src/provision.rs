//! Replica provisioning.
//!
//! A provisioner turns a [`ServiceSpec`] into the address of a replica that
//! is ready to be probed. There is no cluster integration here: addresses are
//! either handed out from a fixed list or backed by in-process endpoints.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use noisy_model::{Limits, LimitsError, LivenessPolicy};
use noisy_replica::ReplicaServer;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Limits for a replica to be provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub max_throughput: u64,
    pub soft_limit: u64,
    pub hard_limit: u64,
}

impl ServiceSpec {
    pub fn limits(&self) -> Limits {
        Limits::new(self.max_throughput, self.soft_limit, self.hard_limit)
    }
}

impl From<Limits> for ServiceSpec {
    fn from(limits: Limits) -> Self {
        Self {
            max_throughput: limits.max_throughput,
            soft_limit: limits.soft_limit,
            hard_limit: limits.hard_limit,
        }
    }
}

/// Provisioning failures.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid service spec: {0}")]
    InvalidSpec(#[from] LimitsError),

    #[error("no provisionable addresses left")]
    Exhausted,

    #[error("failed to start replica: {0}")]
    Start(#[source] std::io::Error),
}

/// Something that can bring up a replica.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision a replica and return the address it is reachable at.
    async fn provision(&self, spec: ServiceSpec) -> Result<String, ProvisionError>;
}

/// Hands out preconfigured addresses in order.
///
/// The spec is validated but otherwise ignored; the replicas behind the
/// addresses were started with whatever limits they were given.
pub struct StaticProvisioner {
    addresses: Mutex<VecDeque<String>>,
}

impl StaticProvisioner {
    pub fn new<I: IntoIterator<Item = String>>(addresses: I) -> Self {
        Self {
            addresses: Mutex::new(addresses.into_iter().collect()),
        }
    }

    /// Addresses not yet handed out.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        match self.addresses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn provision(&self, spec: ServiceSpec) -> Result<String, ProvisionError> {
        spec.limits().validate()?;
        let address = self.lock().pop_front().ok_or(ProvisionError::Exhausted)?;
        info!(address = %address, "Provisioned replica from static pool");
        Ok(address)
    }
}

/// Starts replica endpoints inside this process on ephemeral loopback ports.
pub struct LocalProvisioner {
    liveness_policy: LivenessPolicy,
    servers: tokio::sync::Mutex<Vec<ReplicaServer>>,
}

impl LocalProvisioner {
    pub fn new(liveness_policy: LivenessPolicy) -> Self {
        Self {
            liveness_policy,
            servers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of endpoints started so far.
    pub async fn started(&self) -> usize {
        self.servers.lock().await.len()
    }

    /// Stop every endpoint this provisioner started.
    pub async fn shutdown(&self) {
        let servers = std::mem::take(&mut *self.servers.lock().await);
        for server in servers {
            let addr = server.local_addr();
            if let Err(e) = server.shutdown().await {
                warn!(addr = %addr, error = %e, "Local replica did not shut down cleanly");
            }
        }
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn provision(&self, spec: ServiceSpec) -> Result<String, ProvisionError> {
        let limits = spec.limits();
        limits.validate()?;

        let listen_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = ReplicaServer::spawn(listen_addr, limits, self.liveness_policy)
            .await
            .map_err(ProvisionError::Start)?;
        let address = server.local_addr().to_string();

        info!(
            address = %address,
            max_throughput = spec.max_throughput,
            soft_limit = spec.soft_limit,
            hard_limit = spec.hard_limit,
            "Started local replica"
        );

        self.servers.lock().await.push(server);
        Ok(address)
    }
}
