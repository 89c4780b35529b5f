//! noisy neighbor
//!
//! Steals CPU from a set of replicas for a fixed lifetime, then gives it back.

use anyhow::Result;
use noisy_neighbor::{config::Config, InterferenceAgent};
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

    info!(
        cpu = config.cpu,
        lifetime_secs = config.lifetime.as_secs(),
        addresses = ?config.addresses,
        "Starting noisy neighbor"
    );

    let agent = InterferenceAgent::new(
        config.cpu,
        config.lifetime,
        &config.addresses,
        config.request_timeout,
    )?;

    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
    };

    match agent.run(interrupt).await {
        Ok(outcome) => {
            info!(outcome = ?outcome, "Noisy neighbor finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Noisy neighbor failed");
            Err(e.into())
        }
    }
}
