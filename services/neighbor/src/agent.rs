//! The interference agent.
//!
//! Steals a fixed number of CPU points from every target, holds them for a
//! lifetime and then gives them back. Only targets that actually accepted
//! the interference are restored.

use std::future::Future;
use std::time::Duration;

use noisy_proto::{ClientError, ReplicaClient};
use thiserror::Error;
use tracing::{error, info, warn};

/// Agent failures.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A target refused the interference; earlier targets were restored.
    #[error("failed to apply interference to {address}: {source}")]
    Apply {
        address: String,
        #[source]
        source: ClientError,
        rollback_failures: usize,
    },

    /// Some targets could not be restored.
    #[error("failed to restore CPU on {} of {attempted} replica(s): {}", .failed.len(), .failed.join(", "))]
    Restore {
        failed: Vec<String>,
        attempted: usize,
    },
}

/// How the hold ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// The full lifetime elapsed.
    Expired,

    /// The hold was cut short.
    Interrupted,
}

/// Interference held against a set of replicas.
pub struct InterferenceAgent {
    cpu: u64,
    lifetime: Duration,
    targets: Vec<ReplicaClient>,
}

impl InterferenceAgent {
    pub fn new(
        cpu: u64,
        lifetime: Duration,
        addresses: &[String],
        request_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let targets = addresses
            .iter()
            .map(|address| ReplicaClient::new(address, request_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            cpu,
            lifetime,
            targets,
        })
    }

    pub fn cpu(&self) -> u64 {
        self.cpu
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Apply, hold for the lifetime (or until `interrupt`), then restore.
    pub async fn run<F>(&self, interrupt: F) -> Result<HoldOutcome, AgentError>
    where
        F: Future<Output = ()>,
    {
        let applied = self.apply().await?;

        let outcome = tokio::select! {
            _ = tokio::time::sleep(self.lifetime) => HoldOutcome::Expired,
            _ = interrupt => HoldOutcome::Interrupted,
        };
        info!(
            outcome = ?outcome,
            lifetime_secs = self.lifetime.as_secs(),
            "Releasing stolen CPU"
        );

        self.restore(&applied).await?;
        Ok(outcome)
    }

    /// Steal CPU from every target in order.
    ///
    /// Returns the targets that accepted. On the first refusal the earlier
    /// targets are restored and the refusal is returned.
    pub async fn apply(&self) -> Result<Vec<&ReplicaClient>, AgentError> {
        let mut applied = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            match target.add_interference(self.cpu).await {
                Ok(response) => {
                    info!(
                        address = %target.base_url(),
                        cpu = self.cpu,
                        previous_stolen_cpu = response.previous_stolen_cpu,
                        stolen_cpu = response.stolen_cpu,
                        "Interference applied"
                    );
                    applied.push(target);
                }
                Err(source) => {
                    error!(
                        address = %target.base_url(),
                        error = %source,
                        "Failed to apply interference; rolling back"
                    );
                    let rollback_failures = match self.restore(&applied).await {
                        Ok(()) => 0,
                        Err(AgentError::Restore { failed, .. }) => failed.len(),
                        Err(_) => applied.len(),
                    };
                    return Err(AgentError::Apply {
                        address: target.base_url().to_string(),
                        source,
                        rollback_failures,
                    });
                }
            }
        }

        Ok(applied)
    }

    /// Give the stolen CPU back to `targets`.
    ///
    /// Every target is attempted even if an earlier one fails.
    pub async fn restore(&self, targets: &[&ReplicaClient]) -> Result<(), AgentError> {
        let mut failed = Vec::new();

        for target in targets {
            match target.remove_interference(self.cpu).await {
                Ok(response) => info!(
                    address = %target.base_url(),
                    restored_cpu = response.restored_cpu,
                    stolen_cpu = response.stolen_cpu,
                    "Interference removed"
                ),
                Err(e) => {
                    warn!(address = %target.base_url(), error = %e, "Failed to remove interference");
                    failed.push(target.base_url().to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Restore {
                failed,
                attempted: targets.len(),
            })
        }
    }
}
