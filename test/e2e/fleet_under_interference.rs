//! End-to-end fleet test.
//!
//! Runs three replica endpoints, a controller with its admin API and a noisy
//! neighbor in one process, all talking real HTTP on ephemeral ports:
//!
//! 1. Steady load is spread evenly and fully served
//! 2. A noisy neighbor knocks one replica out for a cooldown tick
//! 3. New services are provisioned until the fleet is full
//! 4. Overload collapses the controller, which then refuses commands
//!
//! ## Running
//!
//! ```bash
//! cargo test -p noisy-e2e --test fleet_under_interference
//! ```

use std::sync::Arc;
use std::time::Duration;

use noisy_controller::{
    api,
    probe::HttpConnector,
    provision::LocalProvisioner,
    AppState, Controller, ControllerConfig, ControllerHandle, ControllerStatus, Phase, TickReport,
};
use noisy_model::{Limits, LivenessPolicy};
use noisy_neighbor::{HoldOutcome, InterferenceAgent};
use noisy_reconcile::Collapse;
use noisy_replica::ReplicaServer;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    replicas: Vec<ReplicaServer>,
    admin_url: String,
    http: reqwest::Client,
    controller: ControllerHandle,
    controller_task: JoinHandle<Result<(), Collapse>>,
    shutdown_tx: watch::Sender<bool>,
    provisioner: Arc<LocalProvisioner>,
}

impl Harness {
    async fn start(replicas: usize, capacity: usize) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let mut servers = Vec::with_capacity(replicas);
        for _ in 0..replicas {
            let server = ReplicaServer::spawn(
                "127.0.0.1:0".parse().unwrap(),
                Limits::default(),
                LivenessPolicy::RawHardLimit,
            )
            .await
            .unwrap();
            servers.push(server);
        }

        let provisioner = Arc::new(LocalProvisioner::new(LivenessPolicy::RawHardLimit));
        let config = ControllerConfig {
            tick_interval: TICK,
            probe_timeout: Duration::from_secs(2),
            fleet_capacity: capacity,
            load: 0,
        };
        let (mut controller, handle) = Controller::new(
            config,
            Arc::new(HttpConnector::new(Duration::from_secs(2)).unwrap()),
            provisioner.clone(),
        );
        for server in &servers {
            controller
                .register(&server.local_addr().to_string())
                .unwrap();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller_task = tokio::spawn(controller.run(shutdown_rx.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let admin_addr = listener.local_addr().unwrap();
        let app = api::create_router(AppState::new(handle.clone()));
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown_rx;
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        Self {
            replicas: servers,
            admin_url: format!("http://{admin_addr}"),
            http: reqwest::Client::new(),
            controller: handle,
            controller_task,
            shutdown_tx,
            provisioner,
        }
    }

    fn address(&self, index: usize) -> String {
        self.replicas[index].local_addr().to_string()
    }

    async fn set_load(&self, load: u64) -> reqwest::Response {
        self.http
            .put(format!("{}/v1/load", self.admin_url))
            .json(&json!({ "load": load }))
            .send()
            .await
            .unwrap()
    }

    async fn status_json(&self) -> serde_json::Value {
        self.http
            .get(format!("{}/v1/status", self.admin_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Wait until the published status satisfies `predicate`.
    async fn wait_for(&self, what: &str, predicate: impl FnMut(&ControllerStatus) -> bool) {
        let mut status = self.controller.subscribe();
        let result = tokio::time::timeout(WAIT, status.wait_for(predicate)).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => panic!("controller exited while waiting for {what}"),
            Err(_) => panic!(
                "timed out waiting for {what}; last status: {:?}",
                self.controller.status()
            ),
        }
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.controller_task.await;
        self.provisioner.shutdown().await;
        for server in self.replicas {
            server.shutdown().await.unwrap();
        }
    }
}

/// Whether the last tick probed the fleet and passes `check`.
fn completed_tick_with(status: &ControllerStatus, check: impl Fn(&TickReport) -> bool) -> bool {
    status
        .last_tick
        .as_ref()
        .is_some_and(|tick| !tick.idle && check(tick))
}

#[tokio::test]
async fn steady_load_is_spread_evenly() {
    let harness = Harness::start(3, 3).await;

    let resp = harness.set_load(900).await;
    assert!(resp.status().is_success(), "set load failed");

    harness
        .wait_for("an evenly served tick", |status| {
            completed_tick_with(status, |tick| {
                tick.load == 900 && tick.stable.len() == 3 && tick.total_throughput == 900
            })
        })
        .await;

    let status = harness.status_json().await;
    assert_eq!(status["phase"], "running");
    assert_eq!(status["load"], 900);
    assert_eq!(status["last_tick"]["per_replica_load"], 300);
    assert_eq!(status["disqualified"], json!([]));

    harness.stop().await;
}

#[tokio::test]
async fn noisy_neighbor_triggers_one_tick_backoff() {
    let harness = Harness::start(3, 3).await;
    let victim = harness.address(0);

    assert!(harness.set_load(3000).await.status().is_success());
    harness
        .wait_for("a fully stable tick", |status| {
            completed_tick_with(status, |tick| tick.load == 3000 && tick.stable.len() == 3)
        })
        .await;

    // 60 points stolen drops the victim's hard limit to 800, below its 1000 share
    let agent = InterferenceAgent::new(
        60,
        Duration::from_secs(3600),
        std::slice::from_ref(&victim),
        Duration::from_secs(2),
    )
    .unwrap();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let neighbor = tokio::spawn(async move {
        agent
            .run(async {
                let _ = release_rx.await;
            })
            .await
    });

    harness
        .wait_for("the victim to be disqualified", |status| {
            status.disqualified.contains(&victim)
        })
        .await;
    assert_eq!(harness.replicas[0].state().replica().stolen_cpu(), 60);

    // While disqualified the others carry the whole load
    harness
        .wait_for("a tick without the victim", |status| {
            completed_tick_with(status, |tick| {
                tick.per_replica_load == Some(1500) && !tick.healthy.contains(&victim)
            })
        })
        .await;

    release_tx.send(()).unwrap();
    assert_eq!(neighbor.await.unwrap().unwrap(), HoldOutcome::Interrupted);
    assert_eq!(harness.replicas[0].state().replica().stolen_cpu(), 0);

    harness
        .wait_for("the victim to serve again", |status| {
            completed_tick_with(status, |tick| {
                tick.stable.len() == 3 && tick.stable.contains(&victim)
            })
        })
        .await;

    harness.stop().await;
}

#[tokio::test]
async fn services_are_provisioned_until_the_fleet_is_full() {
    let harness = Harness::start(2, 3).await;
    let spec = json!({"max_throughput": 1000, "soft_limit": 1500, "hard_limit": 2000});

    let resp = harness
        .http
        .post(format!("{}/v1/services", harness.admin_url))
        .json(&spec)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = resp.json().await.unwrap();
    let provisioned = body["address"].as_str().unwrap().to_string();
    assert_eq!(harness.provisioner.started().await, 1);

    assert!(harness.set_load(900).await.status().is_success());
    harness
        .wait_for("the new replica to serve", |status| {
            completed_tick_with(status, |tick| tick.stable.contains(&provisioned))
        })
        .await;

    let resp = harness
        .http
        .post(format!("{}/v1/services", harness.admin_url))
        .json(&spec)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "fleet_capacity_exhausted");
    assert_eq!(harness.provisioner.started().await, 1);

    harness.stop().await;
}

#[tokio::test]
async fn overload_collapses_the_controller() {
    let harness = Harness::start(3, 3).await;

    assert!(harness.set_load(900).await.status().is_success());
    harness
        .wait_for("a served tick", |status| {
            completed_tick_with(status, |tick| tick.stable.len() == 3)
        })
        .await;

    // 2001 per replica is above every hard limit
    assert!(harness.set_load(6003).await.status().is_success());
    harness
        .wait_for("collapse", |status| status.phase == Phase::Collapsed)
        .await;

    let status = harness.status_json().await;
    assert_eq!(status["phase"], "collapsed");
    assert_eq!(status["collapse"], "no_healthy_replicas");

    let Harness {
        controller_task,
        admin_url,
        http,
        shutdown_tx,
        provisioner,
        replicas,
        ..
    } = harness;

    assert_eq!(
        controller_task.await.unwrap(),
        Err(Collapse::NoHealthyReplicas)
    );

    let resp = http
        .put(format!("{admin_url}/v1/load"))
        .json(&json!({ "load": 900 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let _ = shutdown_tx.send(true);
    provisioner.shutdown().await;
    for server in replicas {
        server.shutdown().await.unwrap();
    }
}
