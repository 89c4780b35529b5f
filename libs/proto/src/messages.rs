//! Request parameters and response payloads.

use serde::{Deserialize, Serialize};

/// `?load=N` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadParams {
    pub load: u64,
}

/// `?cpu=N` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuParams {
    pub cpu: u64,
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Whether the replica survives the offered load.
    pub alive: bool,

    /// Available CPU as a whole-number percentage, e.g. `"50"`.
    pub available_cpu: String,
}

/// Throughput query response. A collapsed replica reports 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputResponse {
    pub throughput: u64,
}

/// Request to change a replica's limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputConfigureRequest {
    pub max_throughput: u64,
    pub soft_limit: u64,
    pub hard_limit: u64,
}

/// Response after a noisy neighbor is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterferenceAddResponse {
    pub previous_stolen_cpu: u64,
    pub stolen_cpu: u64,
}

/// Response after a noisy neighbor is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterferenceRemoveResponse {
    pub restored_cpu: u64,
    pub stolen_cpu: u64,
}
