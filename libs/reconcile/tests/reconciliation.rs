//! Integration tests for the reconciliation engine.
//!
//! These tests drive the reconcilers against `MockRuntime` and check the
//! exact sequence of runtime calls:
//! 1. Idempotence across passes
//! 2. Skip-by-name and create-then-start ordering
//! 3. Removal tolerance for individual containers
//! 4. Network policies

use std::sync::Arc;
use std::time::Duration;

use iot_model::{ContainerSpec, DesiredState, NetworkSpec, VolumeSpec};
use iot_reconcile::{
    ContainerState, FailPoint, MockRuntime, NetworkPolicy, ReconcileError, Reconciler,
    ReconcilerConfig, RuntimeCall,
};

fn containers(names: &[&str]) -> DesiredState {
    let mut state = DesiredState::default();
    for name in names {
        state.containers.insert(
            name.to_string(),
            ContainerSpec::from_image(format!("registry.local/{name}:1")),
        );
    }
    state
}

fn reconciler(runtime: &Arc<MockRuntime>) -> Reconciler {
    Reconciler::new(runtime.clone(), ReconcilerConfig::default())
}

fn policy_reconciler(runtime: &Arc<MockRuntime>, policy: NetworkPolicy) -> Reconciler {
    Reconciler::new(
        runtime.clone(),
        ReconcilerConfig {
            network_policy: policy,
            ..ReconcilerConfig::default()
        },
    )
}

#[tokio::test]
async fn test_container_creation_is_idempotent() {
    let runtime = Arc::new(MockRuntime::new());
    let reconciler = reconciler(&runtime);
    let desired = containers(&["api", "web"]);

    let first = reconciler.create_containers(&desired).await.unwrap();
    assert_eq!(first.created, vec!["api", "web"]);

    runtime.clear_calls().await;
    let second = reconciler.create_containers(&desired).await.unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.skipped, vec!["api", "web"]);
    assert!(runtime.mutating_calls().await.is_empty());
}

#[tokio::test]
async fn test_skip_by_name() {
    let runtime =
        Arc::new(MockRuntime::new().with_container("x-id", "x", ContainerState::Running));

    let report = reconciler(&runtime)
        .create_containers(&containers(&["x"]))
        .await
        .unwrap();

    assert_eq!(report.skipped, vec!["x"]);
    assert_eq!(
        runtime.calls().await,
        vec![RuntimeCall::ListContainers {
            include_stopped: true
        }]
    );
}

#[tokio::test]
async fn test_create_then_start_uses_returned_id() {
    let runtime = Arc::new(MockRuntime::new());

    reconciler(&runtime)
        .create_containers(&containers(&["web"]))
        .await
        .unwrap();

    let calls = runtime.mutating_calls().await;
    assert_eq!(
        calls,
        vec![
            RuntimeCall::PullImage("registry.local/web:1".to_string()),
            RuntimeCall::CreateContainer("web".to_string()),
            RuntimeCall::StartContainer("web-id".to_string()),
        ]
    );
    assert_eq!(
        runtime.container_state("web").await,
        Some(ContainerState::Running)
    );
}

#[tokio::test]
async fn test_failed_create_never_starts_and_aborts() {
    let runtime =
        Arc::new(MockRuntime::new().with_failure(FailPoint::CreateContainer("a".into())));

    let err = reconciler(&runtime)
        .create_containers(&containers(&["a", "b"]))
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::CreateContainer { ref name, .. } if name == "a"));
    let calls = runtime.calls().await;
    assert!(!calls
        .iter()
        .any(|c| matches!(c, RuntimeCall::StartContainer(_))));
    assert!(!calls.contains(&RuntimeCall::CreateContainer("b".to_string())));
}

#[tokio::test]
async fn test_failed_start_aborts_remaining() {
    let runtime =
        Arc::new(MockRuntime::new().with_failure(FailPoint::StartContainer("a-id".into())));

    let err = reconciler(&runtime)
        .create_containers(&containers(&["a", "b"]))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "container_start_failed");
    assert!(!runtime
        .calls()
        .await
        .contains(&RuntimeCall::CreateContainer("b".to_string())));
}

#[tokio::test]
async fn test_removal_tolerates_stop_failure() {
    let runtime = Arc::new(
        MockRuntime::new()
            .with_container("a-id", "a", ContainerState::Running)
            .with_container("b-id", "b", ContainerState::Running)
            .with_failure(FailPoint::StopContainer("a-id".into())),
    );

    let report = reconciler(&runtime)
        .remove_containers(&containers(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(report.failed, vec!["a"]);
    assert_eq!(report.removed, vec!["b"]);

    let calls = runtime.calls().await;
    // A failed stop skips the remove for that container only.
    assert!(!calls.contains(&RuntimeCall::RemoveContainer {
        id: "a-id".to_string(),
        force: true
    }));
    assert!(calls.contains(&RuntimeCall::StopContainer {
        id: "b-id".to_string(),
        timeout: Duration::from_secs(30)
    }));
    assert_eq!(runtime.container_names().await, vec!["a"]);
}

#[tokio::test]
async fn test_removal_of_running_container_stops_then_removes() {
    let runtime =
        Arc::new(MockRuntime::new().with_container("web-id", "web", ContainerState::Running));

    let report = reconciler(&runtime)
        .remove_containers(&containers(&["web"]))
        .await
        .unwrap();

    assert_eq!(report.stopped, vec!["web"]);
    assert_eq!(report.removed, vec!["web"]);
    assert_eq!(
        runtime.mutating_calls().await,
        vec![
            RuntimeCall::StopContainer {
                id: "web-id".to_string(),
                timeout: Duration::from_secs(30),
            },
            RuntimeCall::RemoveContainer {
                id: "web-id".to_string(),
                force: true,
            },
        ]
    );
}

#[tokio::test]
async fn test_volume_creation_is_unconditional() {
    let runtime = Arc::new(MockRuntime::new());
    let reconciler = reconciler(&runtime);
    let desired = DesiredState {
        volumes: vec![VolumeSpec::new("data")],
        ..DesiredState::default()
    };

    reconciler.reconcile_volumes(&desired).await.unwrap();
    reconciler.reconcile_volumes(&desired).await.unwrap();

    let creates = runtime
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, RuntimeCall::CreateVolume(_)))
        .count();
    assert_eq!(creates, 2);
}

fn net_a() -> DesiredState {
    let mut state = DesiredState::default();
    state.networks.insert(
        "net-a".to_string(),
        NetworkSpec::with_driver("bridge").with_subnet("10.0.0.0/24"),
    );
    state
}

#[tokio::test]
async fn test_network_scenario_per_network_policy() {
    let runtime = Arc::new(MockRuntime::new());
    let reconciler = policy_reconciler(&runtime, NetworkPolicy::PerNetwork);
    assert_eq!(reconciler.config().network_policy, NetworkPolicy::PerNetwork);

    let first = reconciler.reconcile_networks(&net_a()).await.unwrap();
    assert_eq!(first.created, vec!["net-a"]);
    assert_eq!(
        runtime.calls().await,
        vec![
            RuntimeCall::ListNetworks,
            RuntimeCall::CreateNetwork("net-a".to_string()),
        ]
    );

    runtime.clear_calls().await;
    let second = reconciler.reconcile_networks(&net_a()).await.unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.skipped, vec!["net-a"]);
    assert!(!second.short_circuited);
    assert_eq!(runtime.calls().await, vec![RuntimeCall::ListNetworks]);
}

#[tokio::test]
async fn test_network_scenario_legacy_policy() {
    let runtime = Arc::new(MockRuntime::new());
    let reconciler = policy_reconciler(&runtime, NetworkPolicy::LegacyShortCircuit);

    let first = reconciler.reconcile_networks(&net_a()).await.unwrap();
    assert_eq!(first.created, vec!["net-a"]);
    assert!(!first.short_circuited);

    runtime.clear_calls().await;
    let second = reconciler.reconcile_networks(&net_a()).await.unwrap();
    assert!(second.short_circuited);
    assert_eq!(runtime.calls().await, vec![RuntimeCall::ListNetworks]);
}

#[tokio::test]
async fn test_legacy_policy_leaves_later_networks_uncreated() {
    let runtime = Arc::new(MockRuntime::new().with_network("net-a"));
    let reconciler = policy_reconciler(&runtime, NetworkPolicy::LegacyShortCircuit);

    let mut desired = net_a();
    desired
        .networks
        .insert("net-b".to_string(), NetworkSpec::with_driver("bridge"));

    let report = reconciler.reconcile_networks(&desired).await.unwrap();
    assert!(report.short_circuited);
    assert!(report.created.is_empty());
    assert_eq!(runtime.network_names().await, vec!["net-a"]);
}

#[tokio::test]
async fn test_full_pass_converges() {
    let runtime = Arc::new(MockRuntime::new());
    let reconciler = reconciler(&runtime);

    let mut desired = containers(&["collector", "broker"]);
    desired.volumes.push(VolumeSpec::new("broker-state"));
    desired
        .networks
        .insert("net-a".to_string(), NetworkSpec::with_driver("bridge"));

    reconciler.run_pass(&desired, true).await.unwrap();
    assert_eq!(runtime.container_names().await, vec!["broker", "collector"]);

    // Without removal, a converged runtime only sees the unconditional volume create.
    runtime.clear_calls().await;
    reconciler.run_pass(&desired, false).await.unwrap();
    assert_eq!(
        runtime.mutating_calls().await,
        vec![RuntimeCall::CreateVolume("broker-state".to_string())]
    );

    // With removal, every declared container is replaced.
    runtime.clear_calls().await;
    let report = reconciler.run_pass(&desired, true).await.unwrap();
    let removal = report.removal.unwrap();
    assert_eq!(removal.removed.len(), 2);
    assert_eq!(report.creation.created, vec!["broker", "collector"]);
}
