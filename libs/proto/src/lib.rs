//! Replica endpoint protocol.
//!
//! Shared between the replica service (server side), the controller and the
//! interference agent (client side):
//!
//! - `routes`: URL paths of the replica endpoint
//! - `messages`: query parameters and JSON payloads
//! - `problem`: RFC 7807-style error bodies and the axum `ApiError`
//! - `client`: typed HTTP client for the replica endpoint

pub mod client;
pub mod messages;
pub mod problem;

pub use client::{ClientError, ReplicaClient};
pub use messages::*;
pub use problem::{ApiError, ProblemDetails};

/// Replica endpoint routes.
pub mod routes {
    /// Load-aware liveness check.
    pub const HEALTH: &str = "/healthz";

    /// Process liveness (no load parameter).
    pub const LIVEZ: &str = "/livez";

    /// Throughput query (GET) and configure (POST).
    pub const THROUGHPUT: &str = "/metrics/throughput";

    /// Steal CPU from the replica.
    pub const NEIGHBORS_ADD: &str = "/neighbors/add";

    /// Restore stolen CPU.
    pub const NEIGHBORS_REMOVE: &str = "/neighbors/remove";
}
