//! Replica capacity model.
//!
//! A replica is configured with a maximum throughput and two load limits.
//! Co-located workloads steal CPU from it, which scales all three values
//! down proportionally. Given an offered load, the replica lands in one of
//! four bands:
//!
//! - **Served**: load fits in the available throughput and is fully handled.
//! - **Saturated**: load exceeds capacity but stays under the soft limit;
//!   throughput plateaus at capacity.
//! - **Degraded**: load is between the soft and hard limits; throughput is
//!   erratic within a bounded band.
//! - **Collapsed**: load exceeds the hard limit; nothing is served.
//!
//! # Invariants
//!
//! - Derived capacity values are recomputed from a single snapshot of the
//!   stolen-CPU counter on every query and never stored.
//! - The stolen-CPU counter never wraps: over-removal and overflow are
//!   rejected without mutating the counter.

mod error;
mod interference;
mod replica;

pub use error::{InterferenceError, LimitsError};
pub use interference::{InterferenceApplied, InterferenceRestored, InterferenceTracker};
pub use replica::{
    CapacitySnapshot, Limits, LivenessPolicy, ReplicaState, ThroughputBand,
    DEFAULT_HARD_LIMIT, DEFAULT_MAX_THROUGHPUT, DEFAULT_SOFT_LIMIT,
};
