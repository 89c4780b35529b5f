//! noisy replica library.
//!
//! This crate primarily ships a `replica` binary, but we expose a small
//! library surface so the controller can run replicas in-process and so the
//! endpoint can be exercised from integration tests.

pub mod api;
pub mod config;
pub mod server;
pub mod state;

pub use server::ReplicaServer;
pub use state::AppState;
