//! Typed commands and the handle used to send them.
//!
//! Commands are queued to the controller task and applied between ticks.
//! Every command carries a reply channel so the caller learns the outcome.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::controller::ControllerStatus;
use crate::fleet::FleetError;
use crate::provision::{ProvisionError, ServiceSpec};

/// Queue depth for pending commands.
pub const COMMAND_BUFFER: usize = 32;

/// Why a command was not applied.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// The controller task has exited.
    #[error("controller is not running")]
    Stopped,
}

/// A request for the controller task.
#[derive(Debug)]
pub enum Command {
    /// Replace the total load from the next tick on.
    SetLoad {
        load: u64,
        reply: oneshot::Sender<()>,
    },

    /// Register an already running replica.
    AddReplica {
        address: String,
        reply: oneshot::Sender<Result<(), CommandError>>,
    },

    /// Provision a new replica and register it.
    AddService {
        spec: ServiceSpec,
        reply: oneshot::Sender<Result<String, CommandError>>,
    },
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ControllerStatus>,
}

impl ControllerHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        status: watch::Receiver<ControllerStatus>,
    ) -> Self {
        Self { commands, status }
    }

    /// Latest published status.
    pub fn status(&self) -> ControllerStatus {
        self.status.borrow().clone()
    }

    /// Watch status updates.
    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.status.clone()
    }

    pub async fn set_load(&self, load: u64) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetLoad { load, reply }).await?;
        rx.await.map_err(|_| CommandError::Stopped)
    }

    pub async fn add_replica(&self, address: impl Into<String>) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddReplica {
            address: address.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| CommandError::Stopped)?
    }

    /// Provision and register a replica, returning its address.
    pub async fn add_service(&self, spec: ServiceSpec) -> Result<String, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddService { spec, reply }).await?;
        rx.await.map_err(|_| CommandError::Stopped)?
    }

    async fn send(&self, command: Command) -> Result<(), CommandError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CommandError::Stopped)
    }
}
