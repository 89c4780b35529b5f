//! Bounded registry of known replicas.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::probe::ReplicaProbe;

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    #[error("fleet is at capacity ({capacity} replicas)")]
    CapacityExhausted { capacity: usize },

    #[error("replica {address} is already registered")]
    AlreadyRegistered { address: String },
}

/// Every replica the controller knows about, keyed by address.
pub struct Fleet {
    capacity: usize,
    members: BTreeMap<String, Arc<dyn ReplicaProbe>>,
}

impl Fleet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.members.contains_key(address)
    }

    pub fn get(&self, address: &str) -> Option<Arc<dyn ReplicaProbe>> {
        self.members.get(address).cloned()
    }

    /// Fail early if another replica would not fit.
    pub fn ensure_room(&self) -> Result<(), FleetError> {
        if self.members.len() >= self.capacity {
            return Err(FleetError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Add a replica under its probe's address.
    pub fn register(&mut self, probe: Arc<dyn ReplicaProbe>) -> Result<(), FleetError> {
        let address = probe.address().to_string();
        if self.members.contains_key(&address) {
            return Err(FleetError::AlreadyRegistered { address });
        }
        self.ensure_room()?;
        self.members.insert(address, probe);
        Ok(())
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}
