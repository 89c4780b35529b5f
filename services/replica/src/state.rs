//! Application state shared across request handlers.

use std::sync::Arc;

use noisy_model::ReplicaState;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    replica: ReplicaState,
}

impl AppState {
    /// Create a new application state.
    pub fn new(replica: ReplicaState) -> Self {
        Self {
            inner: Arc::new(AppStateInner { replica }),
        }
    }

    /// Get a reference to the simulated replica.
    pub fn replica(&self) -> &ReplicaState {
        &self.inner.replica
    }
}
