//! Per-replica admission and throughput model.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{InterferenceError, LimitsError};
use crate::interference::{InterferenceApplied, InterferenceRestored, InterferenceTracker};

/// Default maximum throughput (requests per tick).
pub const DEFAULT_MAX_THROUGHPUT: u64 = 1000;

/// Default soft limit.
pub const DEFAULT_SOFT_LIMIT: u64 = 1500;

/// Default hard limit.
pub const DEFAULT_HARD_LIMIT: u64 = 2000;

/// Configured capacity of a replica, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Requests per tick served with all CPU available.
    pub max_throughput: u64,

    /// Load above which the replica starts thrashing.
    pub soft_limit: u64,

    /// Load above which the replica collapses.
    pub hard_limit: u64,
}

impl Limits {
    pub const fn new(max_throughput: u64, soft_limit: u64, hard_limit: u64) -> Self {
        Self {
            max_throughput,
            soft_limit,
            hard_limit,
        }
    }

    /// Check that the limits describe a usable band layout.
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.soft_limit > self.hard_limit {
            return Err(LimitsError::SoftAboveHard {
                soft_limit: self.soft_limit,
                hard_limit: self.hard_limit,
            });
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_THROUGHPUT, DEFAULT_SOFT_LIMIT, DEFAULT_HARD_LIMIT)
    }
}

/// Which hard limit the liveness check compares against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessPolicy {
    /// Liveness uses the configured hard limit and ignores interference.
    ///
    /// Throughput still degrades under interference, so a replica can be
    /// reported alive while serving nothing.
    #[default]
    RawHardLimit,

    /// Liveness uses the interference-adjusted hard limit.
    InterferenceAdjusted,
}

impl fmt::Display for LivenessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessPolicy::RawHardLimit => write!(f, "raw"),
            LivenessPolicy::InterferenceAdjusted => write!(f, "adjusted"),
        }
    }
}

impl FromStr for LivenessPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "raw_hard_limit" => Ok(LivenessPolicy::RawHardLimit),
            "adjusted" | "interference_adjusted" => Ok(LivenessPolicy::InterferenceAdjusted),
            other => Err(format!(
                "unknown liveness policy {other:?} (expected \"raw\" or \"adjusted\")"
            )),
        }
    }
}

/// Throughput band a load falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThroughputBand {
    Served,
    Saturated,
    Degraded,
    Collapsed,
}

/// Capacity derived from one read of the stolen-CPU counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitySnapshot {
    /// Stolen CPU the snapshot was computed from.
    pub stolen_cpu: u64,

    /// Fraction of CPU left to the replica, in `[0, 1]`.
    pub available_cpu: f64,

    pub available_throughput: u64,
    pub modified_soft_limit: u64,
    pub modified_hard_limit: u64,
}

impl CapacitySnapshot {
    fn compute(limits: &Limits, stolen_cpu: u64) -> Self {
        let available_cpu = ((100.0 - stolen_cpu as f64) / 100.0).clamp(0.0, 1.0);
        let scale = |metric: u64| (metric as f64 * available_cpu).round() as u64;

        Self {
            stolen_cpu,
            available_cpu,
            available_throughput: scale(limits.max_throughput),
            modified_soft_limit: scale(limits.soft_limit),
            modified_hard_limit: scale(limits.hard_limit),
        }
    }

    /// Available CPU as a whole-number percentage string.
    pub fn available_cpu_percent(&self) -> String {
        format!("{:.0}", 100.0 * self.available_cpu)
    }

    /// Classify a load against this snapshot.
    pub fn band(&self, load: u64) -> ThroughputBand {
        if load <= self.available_throughput {
            ThroughputBand::Served
        } else if load <= self.modified_soft_limit {
            ThroughputBand::Saturated
        } else if load <= self.modified_hard_limit {
            ThroughputBand::Degraded
        } else {
            ThroughputBand::Collapsed
        }
    }
}

/// Resource and throughput accounting for one replica.
#[derive(Debug)]
pub struct ReplicaState {
    limits: Limits,
    liveness: LivenessPolicy,
    interference: InterferenceTracker,
}

impl ReplicaState {
    /// Create a replica with no interference and the default liveness policy.
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            liveness: LivenessPolicy::default(),
            interference: InterferenceTracker::new(),
        }
    }

    pub fn with_liveness_policy(mut self, policy: LivenessPolicy) -> Self {
        self.liveness = policy;
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn liveness_policy(&self) -> LivenessPolicy {
        self.liveness
    }

    pub fn stolen_cpu(&self) -> u64 {
        self.interference.stolen_cpu()
    }

    /// Derive current capacity from a single counter read.
    pub fn snapshot(&self) -> CapacitySnapshot {
        CapacitySnapshot::compute(&self.limits, self.interference.stolen_cpu())
    }

    pub fn available_cpu(&self) -> f64 {
        self.snapshot().available_cpu
    }

    pub fn available_throughput(&self) -> u64 {
        self.snapshot().available_throughput
    }

    pub fn modified_soft_limit(&self) -> u64 {
        self.snapshot().modified_soft_limit
    }

    pub fn modified_hard_limit(&self) -> u64 {
        self.snapshot().modified_hard_limit
    }

    /// Whether the replica survives `load` under the configured liveness policy.
    pub fn is_alive(&self, load: u64) -> bool {
        match self.liveness {
            LivenessPolicy::RawHardLimit => self.limits.hard_limit >= load,
            LivenessPolicy::InterferenceAdjusted => self.snapshot().modified_hard_limit >= load,
        }
    }

    pub fn band(&self, load: u64) -> ThroughputBand {
        self.snapshot().band(load)
    }

    /// Throughput achieved when offered `load`.
    pub fn calculate_throughput(&self, load: u64) -> u64 {
        self.calculate_throughput_with(load, &mut rand::rng())
    }

    /// Like [`Self::calculate_throughput`] with a caller-provided RNG for the
    /// degraded band.
    pub fn calculate_throughput_with<R: Rng>(&self, load: u64, rng: &mut R) -> u64 {
        let snapshot = self.snapshot();
        match snapshot.band(load) {
            ThroughputBand::Served => load,
            ThroughputBand::Saturated => snapshot.available_throughput,
            ThroughputBand::Degraded => degraded_throughput(snapshot.available_throughput, rng),
            ThroughputBand::Collapsed => 0,
        }
    }

    pub fn add_interference(&self, cpu: u64) -> Result<InterferenceApplied, InterferenceError> {
        self.interference.add(cpu)
    }

    pub fn remove_interference(
        &self,
        cpu: u64,
    ) -> Result<InterferenceRestored, InterferenceError> {
        self.interference.remove(cpu)
    }
}

/// Uniform draw from `[available / 2, available * 3 / 4)`.
///
/// Bounds are rounded inward so every draw stays within the real-valued
/// band. When no integer fits (capacity below 2) the lower half is returned.
fn degraded_throughput<R: Rng>(available: u64, rng: &mut R) -> u64 {
    let low = available - available / 2;
    let high = available - available / 4;
    if low >= high {
        return available / 2;
    }
    rng.random_range(low..high)
}
