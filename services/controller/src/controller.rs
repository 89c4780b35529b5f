//! The control loop.
//!
//! Every tick the controller splits the total load across the candidate
//! pool, asks each candidate whether it survives its share, re-splits the
//! load across the survivors and asks each how much it actually serves. The
//! verdicts decide next tick's pools (see [`noisy_reconcile::Pools`]). A tick
//! in which nobody serves anything ends the loop for good.
//!
//! Ticks never overlap. Commands and shutdown are only looked at between
//! ticks, so a tick always runs to completion once started.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use noisy_reconcile::{
    partition, share_load, Collapse, Pools, TickVerdicts, DEFAULT_FLEET_CAPACITY,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_TICK_INTERVAL,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandError, ControllerHandle, COMMAND_BUFFER};
use crate::fleet::{Fleet, FleetError};
use crate::probe::{Connector, ProbeError};
use crate::provision::{Provisioner, ServiceSpec};

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Period between tick starts.
    pub tick_interval: Duration,

    /// Upper bound on any single probe.
    pub probe_timeout: Duration,

    /// Maximum number of registered replicas.
    pub fleet_capacity: usize,

    /// Initial total load.
    pub load: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            fleet_capacity: DEFAULT_FLEET_CAPACITY,
            load: 0,
        }
    }
}

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Running,
    Collapsed,
    Stopped,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub load: u64,

    /// Share offered to each candidate in the health phase.
    pub per_replica_load: Option<u64>,

    /// Share offered to each healthy replica in the throughput phase.
    pub actual_load: Option<u64>,

    pub healthy: Vec<String>,
    pub unhealthy: Vec<String>,
    pub stable: Vec<String>,
    pub unstable: Vec<String>,

    /// Sum of the throughput reported by stable replicas.
    pub total_throughput: u64,

    /// Nothing was probed (zero load or an empty fleet).
    pub idle: bool,

    pub collapse: Option<Collapse>,
}

impl TickReport {
    fn new(tick: u64, load: u64) -> Self {
        Self {
            tick,
            load,
            per_replica_load: None,
            actual_load: None,
            healthy: Vec::new(),
            unhealthy: Vec::new(),
            stable: Vec::new(),
            unstable: Vec::new(),
            total_throughput: 0,
            idle: false,
            collapse: None,
        }
    }
}

/// Snapshot published after every tick and command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub phase: Phase,
    pub tick: u64,
    pub load: u64,
    pub fleet_capacity: usize,
    pub candidates: Vec<String>,
    pub disqualified: Vec<String>,
    pub collapse: Option<Collapse>,
    pub last_tick: Option<TickReport>,
}

/// Owns the fleet and the pools and drives ticks.
pub struct Controller {
    config: ControllerConfig,
    fleet: Fleet,
    pools: Pools<String>,
    load: u64,
    tick: u64,
    collapse: Option<Collapse>,
    stopped: bool,
    last_tick: Option<TickReport>,
    connector: Arc<dyn Connector>,
    provisioner: Arc<dyn Provisioner>,
    commands: mpsc::Receiver<Command>,
    status_tx: watch::Sender<ControllerStatus>,
}

impl Controller {
    /// Create a controller with an empty fleet and a handle to command it.
    pub fn new(
        config: ControllerConfig,
        connector: Arc<dyn Connector>,
        provisioner: Arc<dyn Provisioner>,
    ) -> (Self, ControllerHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(ControllerStatus {
            phase: Phase::Running,
            tick: 0,
            load: config.load,
            fleet_capacity: config.fleet_capacity,
            candidates: Vec::new(),
            disqualified: Vec::new(),
            collapse: None,
            last_tick: None,
        });

        let controller = Self {
            fleet: Fleet::new(config.fleet_capacity),
            pools: Pools::default(),
            load: config.load,
            tick: 0,
            collapse: None,
            stopped: false,
            last_tick: None,
            connector,
            provisioner,
            commands,
            status_tx,
            config,
        };

        (controller, ControllerHandle::new(commands_tx, status_rx))
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn pools(&self) -> &Pools<String> {
        &self.pools
    }

    pub fn load(&self) -> u64 {
        self.load
    }

    pub fn status(&self) -> ControllerStatus {
        let phase = if self.collapse.is_some() {
            Phase::Collapsed
        } else if self.stopped {
            Phase::Stopped
        } else {
            Phase::Running
        };

        ControllerStatus {
            phase,
            tick: self.tick,
            load: self.load,
            fleet_capacity: self.fleet.capacity(),
            candidates: self.pools.candidates().to_vec(),
            disqualified: self.pools.disqualified().to_vec(),
            collapse: self.collapse,
            last_tick: self.last_tick.clone(),
        }
    }

    /// Register a running replica; it becomes a candidate from the next tick.
    pub fn register(&mut self, address: &str) -> Result<(), FleetError> {
        let address = address.trim();
        self.fleet.register(self.connector.connect(address))?;
        self.pools.admit(address.to_string());
        info!(
            address,
            fleet_size = self.fleet.len(),
            capacity = self.fleet.capacity(),
            "Replica registered"
        );
        self.publish();
        Ok(())
    }

    pub fn set_load(&mut self, load: u64) {
        info!(previous = self.load, load, "Total load updated");
        self.load = load;
        self.publish();
    }

    /// Provision a replica and register it.
    ///
    /// Capacity is checked first so nothing is provisioned that could not
    /// be registered.
    pub async fn add_service(&mut self, spec: ServiceSpec) -> Result<String, CommandError> {
        self.fleet.ensure_room()?;
        let address = self.provisioner.provision(spec).await?;
        self.register(&address)?;
        Ok(address)
    }

    pub async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetLoad { load, reply } => {
                self.set_load(load);
                let _ = reply.send(());
            }
            Command::AddReplica { address, reply } => {
                let result = self.register(&address).map_err(CommandError::from);
                if let Err(e) = &result {
                    warn!(address = %address, error = %e, "Replica registration rejected");
                }
                let _ = reply.send(result);
            }
            Command::AddService { spec, reply } => {
                let result = self.add_service(spec).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Service provisioning rejected");
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Run one tick.
    ///
    /// Once a tick has collapsed every later call returns the same collapse
    /// without probing.
    pub async fn tick(&mut self) -> Result<TickReport, Collapse> {
        if let Some(collapse) = self.collapse {
            return Err(collapse);
        }

        self.tick += 1;
        let load = self.load;
        let mut report = TickReport::new(self.tick, load);

        if load == 0 || self.fleet.is_empty() {
            debug!(
                tick = self.tick,
                load,
                fleet_size = self.fleet.len(),
                "Idle tick"
            );
            report.idle = true;
            return Ok(self.finish(report));
        }

        let candidates = self.pools.candidates().to_vec();
        let Some(per_replica_load) = share_load(load, candidates.len()) else {
            return Err(self.terminate(report, Collapse::EmptyCandidatePool));
        };
        report.per_replica_load = Some(per_replica_load);

        // Health phase
        let alive = join_all(
            candidates
                .iter()
                .map(|address| self.probe_health(address, per_replica_load)),
        )
        .await;
        let (healthy, unhealthy) = partition(candidates.into_iter().zip(alive), |(_, alive)| *alive);

        let mut verdicts = TickVerdicts {
            healthy: healthy.into_iter().map(|(address, _)| address).collect(),
            unhealthy: unhealthy.into_iter().map(|(address, _)| address).collect(),
            ..TickVerdicts::default()
        };

        // Throughput phase
        if let Some(actual_load) = share_load(load, verdicts.healthy.len()) {
            report.actual_load = Some(actual_load);

            let served = join_all(
                verdicts
                    .healthy
                    .iter()
                    .map(|address| self.probe_throughput(address, actual_load)),
            )
            .await;
            let (stable, unstable) = partition(
                verdicts.healthy.iter().cloned().zip(served),
                |(_, throughput)| *throughput > 0,
            );

            report.total_throughput = stable
                .iter()
                .fold(0u64, |total, (_, throughput)| total.saturating_add(*throughput));
            verdicts.stable = stable.into_iter().map(|(address, _)| address).collect();
            verdicts.unstable = unstable.into_iter().map(|(address, _)| address).collect();
        }

        report.healthy = verdicts.healthy.clone();
        report.unhealthy = verdicts.unhealthy.clone();
        report.stable = verdicts.stable.clone();
        report.unstable = verdicts.unstable.clone();

        match self.pools.advance(&verdicts) {
            Ok(()) => {
                info!(
                    tick = self.tick,
                    load,
                    per_replica_load,
                    stable = verdicts.stable.len(),
                    unstable = verdicts.unstable.len(),
                    unhealthy = verdicts.unhealthy.len(),
                    total_throughput = report.total_throughput,
                    "Tick complete"
                );
                Ok(self.finish(report))
            }
            Err(collapse) => Err(self.terminate(report, collapse)),
        }
    }

    /// Tick on a fixed period until shutdown or collapse.
    ///
    /// Returns `Ok` after a requested shutdown and the collapse reason when
    /// the fleet stops serving.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), Collapse> {
        info!(
            tick_interval_ms = self.config.tick_interval.as_millis() as u64,
            probe_timeout_ms = self.config.probe_timeout.as_millis() as u64,
            load = self.load,
            fleet_size = self.fleet.len(),
            capacity = self.fleet.capacity(),
            "Starting control loop"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = if *shutdown.borrow() {
            Ok(())
        } else {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(collapse) = self.tick().await {
                            break Err(collapse);
                        }
                    }
                    Some(command) = self.commands.recv() => {
                        self.handle_command(command).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break Ok(());
                        }
                    }
                }
            }
        };

        if result.is_ok() {
            info!(tick = self.tick, "Controller shutting down");
            self.stopped = true;
            self.publish();
        }
        result
    }

    async fn probe_health(&self, address: &str, load: u64) -> bool {
        let Some(probe) = self.fleet.get(address) else {
            warn!(address, "Candidate missing from fleet");
            return false;
        };

        match self.bounded(address, probe.health(load)).await {
            Ok(alive) => {
                debug!(address, load, alive, "Health probe");
                alive
            }
            Err(e) => {
                warn!(address, load, error = %e, "Health probe failed; treating replica as unhealthy");
                false
            }
        }
    }

    async fn probe_throughput(&self, address: &str, load: u64) -> u64 {
        let Some(probe) = self.fleet.get(address) else {
            warn!(address, "Healthy replica missing from fleet");
            return 0;
        };

        match self.bounded(address, probe.throughput(load)).await {
            Ok(throughput) => {
                debug!(address, load, throughput, "Throughput probe");
                throughput
            }
            Err(e) => {
                warn!(address, load, error = %e, "Throughput probe failed; treating replica as unstable");
                0
            }
        }
    }

    async fn bounded<T>(
        &self,
        address: &str,
        probe: impl Future<Output = Result<T, ProbeError>>,
    ) -> Result<T, ProbeError> {
        let timeout = self.config.probe_timeout;
        tokio::time::timeout(timeout, probe)
            .await
            .unwrap_or_else(|_| {
                Err(ProbeError::Timeout {
                    address: address.to_string(),
                    timeout,
                })
            })
    }

    fn finish(&mut self, report: TickReport) -> TickReport {
        self.last_tick = Some(report.clone());
        self.publish();
        report
    }

    fn terminate(&mut self, mut report: TickReport, collapse: Collapse) -> Collapse {
        error!(
            tick = self.tick,
            load = self.load,
            candidates = ?self.pools.candidates(),
            disqualified = ?self.pools.disqualified(),
            reason = %collapse,
            "Fleet collapsed; controller terminating"
        );
        report.collapse = Some(collapse);
        self.collapse = Some(collapse);
        self.last_tick = Some(report);
        self.publish();
        collapse
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}
