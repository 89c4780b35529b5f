//! Replica configuration (env-driven).

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use noisy_model::{Limits, LivenessPolicy};

/// Replica configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,

    /// Throughput and load limits.
    pub limits: Limits,

    /// Which hard limit liveness checks compare against.
    pub liveness_policy: LivenessPolicy,

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
        let listen_addr = lookup("NOISY_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("NOISY_LISTEN_ADDR must be a socket address (host:port).")?;

        let defaults = Limits::default();
        let limits = Limits::new(
            parse_or(&lookup, "NOISY_MAX_THROUGHPUT", defaults.max_throughput)?,
            parse_or(&lookup, "NOISY_SOFT_LIMIT", defaults.soft_limit)?,
            parse_or(&lookup, "NOISY_HARD_LIMIT", defaults.hard_limit)?,
        );
        limits.validate().context("Invalid replica limits.")?;

        let liveness_policy = match lookup("NOISY_LIVENESS_POLICY") {
            Some(value) => value
                .parse::<LivenessPolicy>()
                .map_err(|e| anyhow!(e))
                .context("NOISY_LIVENESS_POLICY is invalid.")?,
            None => LivenessPolicy::default(),
        };

        let log_level = lookup("NOISY_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            listen_addr,
            limits,
            liveness_policy,
            log_level,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.parse())
        .transpose()
        .with_context(|| format!("{key} must be a non-negative integer."))
        .map(|v| v.unwrap_or(default))
}
