//! Agent runs against real replica endpoints.

use std::time::Duration;

use noisy_model::{Limits, LivenessPolicy};
use noisy_neighbor::{AgentError, HoldOutcome, InterferenceAgent};
use noisy_replica::ReplicaServer;

async fn spawn_replica() -> ReplicaServer {
    ReplicaServer::spawn(
        "127.0.0.1:0".parse().unwrap(),
        Limits::default(),
        LivenessPolicy::default(),
    )
    .await
    .unwrap()
}

fn addresses(servers: &[&ReplicaServer]) -> Vec<String> {
    servers
        .iter()
        .map(|s| s.local_addr().to_string())
        .collect()
}

#[tokio::test]
async fn cpu_is_stolen_while_held_and_restored_after() {
    let a = spawn_replica().await;
    let b = spawn_replica().await;

    let agent = InterferenceAgent::new(
        50,
        Duration::from_secs(3600),
        &addresses(&[&a, &b]),
        Duration::from_secs(2),
    )
    .unwrap();

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        agent
            .run(async {
                let _ = release_rx.await;
            })
            .await
    });

    // Wait until both replicas see the neighbor
    for _ in 0..100 {
        if a.state().replica().stolen_cpu() == 50 && b.state().replica().stolen_cpu() == 50 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(a.state().replica().available_throughput(), 500);
    assert_eq!(b.state().replica().available_throughput(), 500);

    release_tx.send(()).unwrap();
    assert_eq!(run.await.unwrap().unwrap(), HoldOutcome::Interrupted);

    assert_eq!(a.state().replica().stolen_cpu(), 0);
    assert_eq!(b.state().replica().stolen_cpu(), 0);
}

#[tokio::test]
async fn overflow_on_second_target_rolls_back_first() {
    let a = spawn_replica().await;
    let b = spawn_replica().await;
    b.state().replica().add_interference(u64::MAX - 10).unwrap();

    let agent = InterferenceAgent::new(
        20,
        Duration::from_secs(3600),
        &addresses(&[&a, &b]),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = agent.run(std::future::pending()).await.unwrap_err();

    assert!(matches!(err, AgentError::Apply { rollback_failures: 0, .. }));
    assert_eq!(a.state().replica().stolen_cpu(), 0);
    assert_eq!(b.state().replica().stolen_cpu(), u64::MAX - 10);
}
