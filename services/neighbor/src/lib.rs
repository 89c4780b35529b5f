//! noisy neighbor library.
//!
//! A neighbor is a short-lived workload that shares hosts with replicas and
//! steals CPU from them while it runs.

pub mod agent;
pub mod config;

pub use agent::{AgentError, HoldOutcome, InterferenceAgent};
