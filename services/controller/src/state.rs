//! Application state shared across admin API handlers.

use std::sync::Arc;

use crate::command::ControllerHandle;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    controller: ControllerHandle,
}

impl AppState {
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            inner: Arc::new(AppStateInner { controller }),
        }
    }

    /// Handle to the running controller.
    pub fn controller(&self) -> &ControllerHandle {
        &self.inner.controller
    }
}
