//! Running replica endpoint with graceful shutdown.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use noisy_model::{Limits, LivenessPolicy, ReplicaState};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api;
use crate::state::AppState;

/// A replica endpoint serving on a bound socket.
pub struct ReplicaServer {
    local_addr: SocketAddr,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<io::Result<()>>,
}

impl ReplicaServer {
    /// Bind `listen_addr` and start serving a fresh replica with `limits`.
    pub async fn spawn(
        listen_addr: SocketAddr,
        limits: Limits,
        liveness_policy: LivenessPolicy,
    ) -> io::Result<Self> {
        let replica = ReplicaState::new(limits).with_liveness_policy(liveness_policy);
        Self::spawn_with_state(listen_addr, AppState::new(replica)).await
    }

    /// Bind `listen_addr` and serve an existing state.
    pub async fn spawn_with_state(listen_addr: SocketAddr, state: AppState) -> io::Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = api::create_router(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let mut shutdown_rx = shutdown_rx;
                    loop {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                    info!(addr = %local_addr, "Replica endpoint shutting down");
                })
                .await
        });

        info!(
            addr = %local_addr,
            max_throughput = state.replica().limits().max_throughput,
            soft_limit = state.replica().limits().soft_limit,
            hard_limit = state.replica().limits().hard_limit,
            liveness_policy = %state.replica().liveness_policy(),
            "Replica endpoint listening"
        );

        Ok(Self {
            local_addr,
            state,
            shutdown_tx,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Whether the serve task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop accepting connections and wait for the serve task.
    pub async fn shutdown(self) -> io::Result<()> {
        let _ = self.shutdown_tx.send(true);
        join(self.handle).await
    }

    /// Serve until `signal` resolves or the serve task exits on its own.
    pub async fn run_until<F>(self, signal: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            shutdown_tx,
            mut handle,
            ..
        } = self;

        tokio::select! {
            _ = signal => {
                let _ = shutdown_tx.send(true);
            }
            result = &mut handle => {
                return flatten(result);
            }
        }

        join(handle).await
    }
}

async fn join(handle: JoinHandle<io::Result<()>>) -> io::Result<()> {
    flatten(handle.await)
}

fn flatten(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    match result {
        Ok(result) => result,
        Err(e) => Err(io::Error::other(e)),
    }
}
