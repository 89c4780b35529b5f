//! noisy controller library.
//!
//! The `controller` binary wires these pieces together; they are exposed as
//! a library so ticks can be driven directly and so end-to-end tests can
//! run a controller in-process.
//!
//! - [`controller`]: the tick loop and its status reporting
//! - [`fleet`]: bounded registry of known replicas
//! - [`probe`]: how replicas are asked for health and throughput
//! - [`provision`]: how new replicas are obtained
//! - [`command`]: typed commands and the handle used to send them
//! - [`api`]: admin HTTP API

pub mod api;
pub mod command;
pub mod config;
pub mod controller;
pub mod fleet;
pub mod probe;
pub mod provision;
pub mod state;

pub use command::{CommandError, ControllerHandle};
pub use controller::{Controller, ControllerConfig, ControllerStatus, Phase, TickReport};
pub use state::AppState;
