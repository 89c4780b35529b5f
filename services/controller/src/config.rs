//! Controller configuration (env-driven).

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use noisy_model::LivenessPolicy;
use noisy_reconcile::DEFAULT_FLEET_CAPACITY;

use crate::controller::ControllerConfig;

/// Shortest accepted tick interval.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// How `AddService` obtains replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionerKind {
    /// Hand out `NOISY_PROVISION_ADDRS` in order.
    #[default]
    Static,

    /// Start replica endpoints inside the controller process.
    Local,
}

impl FromStr for ProvisionerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "local" => Ok(Self::Local),
            other => Err(anyhow!(
                "unknown provisioner '{other}' (expected 'static' or 'local')"
            )),
        }
    }
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admin API listen address.
    pub listen_addr: SocketAddr,

    /// Replicas registered at startup.
    pub replicas: Vec<String>,

    /// Initial total load.
    pub load: u64,

    pub tick_interval: Duration,

    /// Per-request timeout for replica probes.
    pub request_timeout: Duration,

    /// Maximum number of registered replicas.
    pub fleet_capacity: usize,

    pub provisioner: ProvisionerKind,

    /// Addresses handed out by the static provisioner.
    pub provision_addrs: Vec<String>,

    /// Liveness policy for locally provisioned replicas.
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
            .unwrap_or_else(|| "127.0.0.1:7070".to_string())
            .parse()
            .context("NOISY_LISTEN_ADDR must be a socket address (host:port).")?;

        let replicas = address_list(lookup("NOISY_REPLICAS"));
        let load = parse_or(&lookup, "NOISY_LOAD", 0u64)?;

        let tick_interval =
            Duration::from_millis(parse_or(&lookup, "NOISY_TICK_INTERVAL_MS", 1000u64)?);
        if tick_interval < MIN_TICK_INTERVAL {
            bail!(
                "NOISY_TICK_INTERVAL_MS must be at least {} ms.",
                MIN_TICK_INTERVAL.as_millis()
            );
        }

        let request_timeout =
            Duration::from_millis(parse_or(&lookup, "NOISY_REQUEST_TIMEOUT_MS", 3000u64)?);
        if request_timeout.is_zero() {
            bail!("NOISY_REQUEST_TIMEOUT_MS must be positive.");
        }

        let fleet_capacity = parse_or(&lookup, "NOISY_FLEET_CAPACITY", DEFAULT_FLEET_CAPACITY)?;
        if fleet_capacity == 0 {
            bail!("NOISY_FLEET_CAPACITY must be at least 1.");
        }
        if replicas.len() > fleet_capacity {
            bail!(
                "NOISY_REPLICAS lists {} replicas but NOISY_FLEET_CAPACITY is {}.",
                replicas.len(),
                fleet_capacity
            );
        }

        let provisioner = match lookup("NOISY_PROVISIONER") {
            Some(value) => value.parse().context("NOISY_PROVISIONER is invalid.")?,
            None => ProvisionerKind::default(),
        };
        let provision_addrs = address_list(lookup("NOISY_PROVISION_ADDRS"));

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
            replicas,
            load,
            tick_interval,
            request_timeout,
            fleet_capacity,
            provisioner,
            provision_addrs,
            liveness_policy,
            log_level,
        })
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            tick_interval: self.tick_interval,
            probe_timeout: self.request_timeout,
            fleet_capacity: self.fleet_capacity,
            load: self.load,
        }
    }
}

fn address_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse())
        .transpose()
        .with_context(|| format!("{key} must be a non-negative integer."))
        .map(|v| v.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:7070".parse().unwrap());
        assert!(config.replicas.is_empty());
        assert_eq!(config.load, 0);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.fleet_capacity, 3);
        assert_eq!(config.provisioner, ProvisionerKind::Static);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_address_lists_are_trimmed() {
        let config = Config::from_lookup(lookup(&[
            ("NOISY_REPLICAS", " 127.0.0.1:8080, 127.0.0.1:8081 ,,"),
            ("NOISY_PROVISION_ADDRS", "127.0.0.1:9000"),
            ("NOISY_PROVISIONER", "Local"),
        ]))
        .unwrap();

        assert_eq!(config.replicas, vec!["127.0.0.1:8080", "127.0.0.1:8081"]);
        assert_eq!(config.provision_addrs, vec!["127.0.0.1:9000"]);
        assert_eq!(config.provisioner, ProvisionerKind::Local);
    }

    #[test]
    fn test_controller_config() {
        let config = Config::from_lookup(lookup(&[
            ("NOISY_LOAD", "900"),
            ("NOISY_TICK_INTERVAL_MS", "250"),
            ("NOISY_REQUEST_TIMEOUT_MS", "100"),
            ("NOISY_FLEET_CAPACITY", "5"),
        ]))
        .unwrap()
        .controller_config();

        assert_eq!(config.load, 900);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.probe_timeout, Duration::from_millis(100));
        assert_eq!(config.fleet_capacity, 5);
    }

    #[rstest]
    #[case("NOISY_LOAD", "-1")]
    #[case("NOISY_TICK_INTERVAL_MS", "5")]
    #[case("NOISY_REQUEST_TIMEOUT_MS", "0")]
    #[case("NOISY_FLEET_CAPACITY", "0")]
    #[case("NOISY_PROVISIONER", "kubernetes")]
    #[case("NOISY_LIVENESS_POLICY", "sometimes")]
    #[case("NOISY_LISTEN_ADDR", "localhost")]
    fn test_invalid_values_are_rejected(#[case] key: &str, #[case] value: &str) {
        assert!(Config::from_lookup(lookup(&[(key, value)])).is_err());
    }

    #[test]
    fn test_too_many_replicas_for_capacity() {
        let result = Config::from_lookup(lookup(&[
            ("NOISY_REPLICAS", "a:1,b:2"),
            ("NOISY_FLEET_CAPACITY", "1"),
        ]));
        assert!(result.is_err());
    }
}
