//! noisy replica
//!
//! A single simulated replica. It reports whether it survives an offered
//! load, how much throughput it achieves under that load, and accepts noisy
//! neighbors that steal CPU from it.

use anyhow::Result;
use noisy_replica::{config::Config, ReplicaServer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to NOISY_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting noisy replica");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    let server =
        ReplicaServer::spawn(config.listen_addr, config.limits, config.liveness_policy).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    if let Err(e) = server.run_until(shutdown).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Replica shutdown complete");
    Ok(())
}
