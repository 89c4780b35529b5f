//! Error types for the replica model.

use thiserror::Error;

/// Errors from mutating the stolen-CPU counter.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InterferenceError {
    /// More CPU was restored than is currently stolen.
    #[error("cannot restore {requested} CPU points: only {stolen_cpu} are stolen")]
    OverRemoval { stolen_cpu: u64, requested: u64 },

    /// The counter would exceed its representable range.
    #[error("stealing {requested} CPU points overflows the counter (currently {stolen_cpu})")]
    Overflow { stolen_cpu: u64, requested: u64 },
}

/// Errors from validating replica limits.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LimitsError {
    /// The soft limit is above the hard limit.
    #[error("soft limit {soft_limit} exceeds hard limit {hard_limit}")]
    SoftAboveHard { soft_limit: u64, hard_limit: u64 },
}
