//! Pool reconciliation primitives.
//!
//! The controller keeps every known replica in exactly one of two pools:
//!
//! - **Candidates**: eligible for this tick's load assignment.
//! - **Disqualified**: serving a one-tick cooldown after producing zero
//!   throughput.
//!
//! Each tick probes the candidates twice (liveness, then throughput) and
//! feeds the verdicts into [`Pools::advance`], which computes next tick's
//! membership:
//!
//! ```text
//! candidates'   = stable ++ unhealthy ++ disqualified
//! disqualified' = unstable
//! ```
//!
//! A liveness failure is retried on the very next tick; a replica that is
//! alive but serves nothing sits out one full tick first.
//!
//! # Invariants
//!
//! - Candidates and disqualified are disjoint and together hold every known
//!   replica at the start of a tick.
//! - Decisions are deterministic given the same verdicts.
//! - A collapse leaves the pools untouched.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Why a tick ended the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collapse {
    /// There was no candidate to assign load to.
    #[error("no candidate replicas to assign load to")]
    EmptyCandidatePool,

    /// Every candidate failed its liveness check.
    #[error("every candidate failed its liveness check")]
    NoHealthyReplicas,

    /// No healthy replica produced any throughput.
    #[error("no replica produced throughput")]
    NoStableReplicas,
}

/// Split `load` evenly across `members`.
///
/// Returns `None` when there is nobody to share with.
pub fn share_load(load: u64, members: usize) -> Option<u64> {
    if members == 0 {
        return None;
    }
    Some(load / members as u64)
}

/// Split items by a predicate, preserving order within each side.
pub fn partition<I, F>(items: I, predicate: F) -> (Vec<I::Item>, Vec<I::Item>)
where
    I: IntoIterator,
    F: Fn(&I::Item) -> bool,
{
    let mut matching = Vec::new();
    let mut rest = Vec::new();

    for item in items {
        if predicate(&item) {
            matching.push(item);
        } else {
            rest.push(item);
        }
    }

    (matching, rest)
}

/// Verdicts gathered during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickVerdicts<K> {
    /// Candidates that passed the liveness check.
    pub healthy: Vec<K>,

    /// Candidates that failed the liveness check or could not be reached.
    pub unhealthy: Vec<K>,

    /// Healthy replicas with nonzero throughput.
    pub stable: Vec<K>,

    /// Healthy replicas with zero throughput or a failed throughput query.
    pub unstable: Vec<K>,
}

impl<K> Default for TickVerdicts<K> {
    fn default() -> Self {
        Self {
            healthy: Vec::new(),
            unhealthy: Vec::new(),
            stable: Vec::new(),
            unstable: Vec::new(),
        }
    }
}

/// Candidate and disqualified pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pools<K> {
    candidates: Vec<K>,
    disqualified: Vec<K>,
}

impl<K> Default for Pools<K> {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            disqualified: Vec::new(),
        }
    }
}

impl<K: Clone + Ord> Pools<K> {
    /// Seed the candidate pool with every known replica.
    pub fn seeded<I: IntoIterator<Item = K>>(known: I) -> Self {
        let mut pools = Self::default();
        for key in known {
            pools.admit(key);
        }
        pools
    }

    pub fn candidates(&self) -> &[K] {
        &self.candidates
    }

    pub fn disqualified(&self) -> &[K] {
        &self.disqualified
    }

    /// Total number of replicas tracked across both pools.
    pub fn len(&self) -> usize {
        self.candidates.len() + self.disqualified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.disqualified.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.candidates.contains(key) || self.disqualified.contains(key)
    }

    /// Add a newly registered replica as a candidate.
    ///
    /// Returns false if it is already tracked.
    pub fn admit(&mut self, key: K) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.candidates.push(key);
        true
    }

    /// Compute next tick's pools from this tick's verdicts.
    ///
    /// Fails, leaving the pools unchanged, when no replica is stable.
    pub fn advance(&mut self, verdicts: &TickVerdicts<K>) -> Result<(), Collapse> {
        if verdicts.stable.is_empty() {
            return Err(if verdicts.healthy.is_empty() {
                Collapse::NoHealthyReplicas
            } else {
                Collapse::NoStableReplicas
            });
        }

        let mut next = Vec::with_capacity(self.len());
        next.extend(verdicts.stable.iter().cloned());
        next.extend(verdicts.unhealthy.iter().cloned());
        next.append(&mut self.disqualified);

        self.candidates = next;
        self.disqualified = verdicts.unstable.clone();
        Ok(())
    }

    /// Check that the pools are disjoint and cover exactly `known`.
    pub fn covers_exactly(&self, known: &BTreeSet<K>) -> bool {
        let mut seen = BTreeSet::new();
        for key in self.candidates.iter().chain(&self.disqualified) {
            if !seen.insert(key.clone()) {
                return false;
            }
        }
        &seen == known
    }
}

/// Default tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default fleet capacity.
pub const DEFAULT_FLEET_CAPACITY: usize = 3;
