//! Neighbor configuration (env-driven).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use noisy_proto::client::DEFAULT_REQUEST_TIMEOUT;

/// Neighbor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long the stolen CPU is held.
    pub lifetime: Duration,

    /// CPU points stolen from each target.
    pub cpu: u64,

    /// Replica addresses to steal from.
    pub addresses: Vec<String>,

    pub request_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lifetime_secs: u64 = required(&lookup, "NOISY_NEIGHBOR_LIFETIME_SECS")?
            .parse()
            .context("NOISY_NEIGHBOR_LIFETIME_SECS must be a whole number of seconds.")?;

        let cpu: u64 = required(&lookup, "NOISY_NEIGHBOR_CPU")?
            .parse()
            .context("NOISY_NEIGHBOR_CPU must be a non-negative integer.")?;

        let addresses: Vec<String> = required(&lookup, "NOISY_NEIGHBOR_ADDRESSES")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if addresses.is_empty() {
            bail!("NOISY_NEIGHBOR_ADDRESSES must list at least one address.");
        }

        let request_timeout = match lookup("NOISY_REQUEST_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(
                value
                    .trim()
                    .parse()
                    .context("NOISY_REQUEST_TIMEOUT_MS must be a non-negative integer.")?,
            ),
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let log_level = lookup("NOISY_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            lifetime: Duration::from_secs(lifetime_secs),
            cpu,
            addresses,
            request_timeout,
            log_level,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => bail!("{key} is required."),
    }
}
