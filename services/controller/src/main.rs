//! noisy controller
//!
//! Spreads a total load across a small fleet of replicas once per tick,
//! demotes replicas that stop serving for a one-tick cooldown, and stops for
//! good when no replica serves anything. An admin API reports status and
//! accepts load changes and new replicas.

use std::sync::Arc;

use anyhow::{Context, Result};
use noisy_controller::{
    api,
    config::{Config, ProvisionerKind},
    probe::HttpConnector,
    provision::{LocalProvisioner, Provisioner, StaticProvisioner},
    AppState, Controller,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to NOISY_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting noisy controller");
    info!(
        listen_addr = %config.listen_addr,
        replicas = ?config.replicas,
        load = config.load,
        provisioner = ?config.provisioner,
        "Configuration loaded"
    );

    let connector = HttpConnector::new(config.request_timeout)
        .context("Failed to build replica HTTP client")?;

    let local_provisioner = match config.provisioner {
        ProvisionerKind::Local => Some(Arc::new(LocalProvisioner::new(config.liveness_policy))),
        ProvisionerKind::Static => None,
    };
    let provisioner: Arc<dyn Provisioner> = match &local_provisioner {
        Some(local) => local.clone(),
        None => Arc::new(StaticProvisioner::new(config.provision_addrs.clone())),
    };

    let (mut controller, handle) =
        Controller::new(config.controller_config(), Arc::new(connector), provisioner);
    for address in &config.replicas {
        controller
            .register(address)
            .with_context(|| format!("Failed to register replica {address}"))?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut controller_handle = tokio::spawn(controller.run(shutdown_rx.clone()));

    let app = api::create_router(AppState::new(handle));
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Admin API listening");

    let server_handle = tokio::spawn(async move {
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
                info!("Admin API shutting down");
            })
            .await
    });

    let mut exit = Ok(());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut controller_handle => {
            match result {
                Ok(Ok(())) => info!("Controller exited"),
                Ok(Err(collapse)) => {
                    error!(reason = %collapse, "Controller terminated");
                    exit = Err(anyhow::Error::new(collapse));
                }
                Err(e) => {
                    error!(error = %e, "Controller task panicked");
                    exit = Err(e.into());
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if !controller_handle.is_finished() {
        if let Err(e) = tokio::time::timeout(shutdown_timeout, controller_handle).await {
            warn!(error = %e, "Controller did not shut down in time");
        }
    }
    match tokio::time::timeout(shutdown_timeout, server_handle).await {
        Ok(Ok(Err(e))) => warn!(error = %e, "Admin API error"),
        Ok(Err(e)) => warn!(error = %e, "Admin API task panicked"),
        Err(e) => warn!(error = %e, "Admin API did not shut down in time"),
        Ok(Ok(Ok(()))) => {}
    }

    if let Some(local) = local_provisioner {
        local.shutdown().await;
    }

    info!("Controller shutdown complete");
    exit
}
