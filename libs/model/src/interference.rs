//! Stolen-CPU accounting.
//!
//! Interference agents add and remove CPU concurrently with throughput and
//! liveness queries. Every mutation is a single compare-and-swap loop on one
//! atomic, so the before/after values reported back are exactly the values
//! this call observed and stored.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::InterferenceError;

/// Result of stealing CPU from a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterferenceApplied {
    pub previous_stolen_cpu: u64,
    pub stolen_cpu: u64,
}

/// Result of restoring CPU to a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterferenceRestored {
    pub restored_cpu: u64,
    pub stolen_cpu: u64,
}

/// Tracks CPU percentage points stolen by co-located workloads.
#[derive(Debug, Default)]
pub struct InterferenceTracker {
    stolen_cpu: AtomicU64,
}

impl InterferenceTracker {
    /// Create a tracker with no stolen CPU.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker starting from an existing amount of stolen CPU.
    pub fn with_stolen(stolen_cpu: u64) -> Self {
        Self {
            stolen_cpu: AtomicU64::new(stolen_cpu),
        }
    }

    /// Current stolen CPU (lock-free snapshot).
    pub fn stolen_cpu(&self) -> u64 {
        self.stolen_cpu.load(Ordering::Acquire)
    }

    /// Steal `cpu` points.
    pub fn add(&self, cpu: u64) -> Result<InterferenceApplied, InterferenceError> {
        let previous = self
            .stolen_cpu
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(cpu)
            })
            .map_err(|stolen_cpu| InterferenceError::Overflow {
                stolen_cpu,
                requested: cpu,
            })?;

        Ok(InterferenceApplied {
            previous_stolen_cpu: previous,
            stolen_cpu: previous + cpu,
        })
    }

    /// Restore `cpu` points.
    ///
    /// Fails without touching the counter if fewer than `cpu` points are
    /// currently stolen.
    pub fn remove(&self, cpu: u64) -> Result<InterferenceRestored, InterferenceError> {
        let previous = self
            .stolen_cpu
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(cpu)
            })
            .map_err(|stolen_cpu| InterferenceError::OverRemoval {
                stolen_cpu,
                requested: cpu,
            })?;

        Ok(InterferenceRestored {
            restored_cpu: cpu,
            stolen_cpu: previous - cpu,
        })
    }
}
