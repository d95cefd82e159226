//! End-to-end IPC tests against a live socket server
//!
//! Spins up the orchestrator with a real Unix socket in a temp dir and
//! drives it through the typed client, the same way the CLI does.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use agent_react_devtools::daemon::Daemon;
use agent_react_devtools::ipc::{run_ipc_server, ComponentRef, IpcClient, Request, WaitKind};
use agent_react_devtools::wire::OpsDecoder;

use common::{BatchBuilder, KIND_FUNCTION};

struct Fixture {
    daemon: Arc<Daemon>,
    socket_path: PathBuf,
    _dir: TempDir,
}

async fn start_daemon() -> Fixture {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("daemon.sock");
    let daemon = Arc::new(Daemon::new(8097));

    let listener = UnixListener::bind(&socket_path).unwrap();
    tokio::spawn(run_ipc_server(listener, Arc::clone(&daemon)));

    Fixture {
        daemon,
        socket_path,
        _dir: dir,
    }
}

/// Simulate a connected runtime: register a peer and push one batch
fn attach_runtime(daemon: &Daemon, peer: &str, ints: Vec<i64>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    daemon.register_peer(peer, tx);
    // Drain broadcasts so the channel never reports closed mid-test
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let batch = OpsDecoder::new().decode(&ints).unwrap();
    daemon.apply_operations(peer, &batch);
}

#[tokio::test]
async fn ping_and_status_roundtrip() {
    let fx = start_daemon().await;
    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client.request(&Request::Ping).await.unwrap();
    assert!(response.ok);

    let response = client.request(&Request::Status).await.unwrap();
    assert!(response.ok);
    let data = response.data.unwrap();
    assert_eq!(data["daemonRunning"], true);
    assert_eq!(data["port"], 8097);
    assert_eq!(data["connectedApps"], 0);
    assert_eq!(data["componentCount"], 0);
    assert_eq!(data["connection"]["hasEverConnected"], false);
}

#[tokio::test]
async fn get_tree_labels_and_depths() {
    let fx = start_daemon().await;
    attach_runtime(
        &fx.daemon,
        "peer_a",
        BatchBuilder::new(1, 100)
            .add_root()
            .add(1, KIND_FUNCTION, 100, "App")
            .add(2, KIND_FUNCTION, 1, "Shell")
            .build(),
    );

    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client
        .request(&Request::GetTree { depth: None })
        .await
        .unwrap();
    let entries = response.data.unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["label"], "@c1");
    assert_eq!(entries[1]["displayName"], "App");
    assert_eq!(entries[2]["label"], "@c3");

    let response = client
        .request(&Request::GetTree { depth: Some(0) })
        .await
        .unwrap();
    assert_eq!(response.data.unwrap().as_array().unwrap().len(), 1);

    let response = client
        .request(&Request::GetTree { depth: Some(1) })
        .await
        .unwrap();
    assert_eq!(response.data.unwrap().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn find_count_and_label_resolution() {
    let fx = start_daemon().await;
    attach_runtime(
        &fx.daemon,
        "peer_a",
        BatchBuilder::new(1, 100)
            .add_root()
            .add(1, KIND_FUNCTION, 100, "User")
            .add(2, KIND_FUNCTION, 100, "UserCard")
            .add(3, KIND_FUNCTION, 100, "UserProfile")
            .build(),
    );

    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client
        .request(&Request::Find {
            name: "user".to_string(),
            exact: false,
        })
        .await
        .unwrap();
    assert_eq!(response.data.unwrap().as_array().unwrap().len(), 3);

    let response = client
        .request(&Request::Find {
            name: "User".to_string(),
            exact: true,
        })
        .await
        .unwrap();
    let matches = response.data.unwrap();
    assert_eq!(matches.as_array().unwrap().len(), 1);
    assert_eq!(matches[0]["displayName"], "User");

    let response = client.request(&Request::Count).await.unwrap();
    let data = response.data.unwrap();
    assert_eq!(data["total"], 4);
    assert_eq!(data["byKind"]["Function"], 3);
}

#[tokio::test]
async fn get_component_not_found_and_label_echo() {
    let fx = start_daemon().await;
    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client
        .request(&Request::GetComponent {
            id: ComponentRef::Id(3),
        })
        .await
        .unwrap();
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("Component 3 not found"));

    let response = client
        .request(&Request::GetComponent {
            id: ComponentRef::Label("@c1".to_string()),
        })
        .await
        .unwrap();
    assert!(!response.ok);
    assert_eq!(response.label.as_deref(), Some("@c1"));
    assert_eq!(response.error.as_deref(), Some("Component @c1 not found"));
}

#[tokio::test]
async fn malformed_lines_keep_connection_open() {
    let fx = start_daemon().await;
    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client.request_raw("this is not json").await.unwrap();
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("Invalid JSON"));

    let response = client
        .request_raw(r#"{"type":"mystery-command"}"#)
        .await
        .unwrap();
    assert_eq!(
        response.error.as_deref(),
        Some("Unknown command: mystery-command")
    );

    // Same connection still serves valid requests
    let response = client.request(&Request::Ping).await.unwrap();
    assert!(response.ok);
}

#[tokio::test]
async fn wait_component_resolves_when_batch_lands() {
    let fx = start_daemon().await;
    attach_runtime(
        &fx.daemon,
        "peer_a",
        BatchBuilder::new(1, 100).add_root().build(),
    );

    let mut wait_client = IpcClient::connect(&fx.socket_path).await.unwrap();
    let wait_task = tokio::spawn(async move {
        wait_client
            .request(&Request::Wait {
                condition: WaitKind::Component,
                name: Some("Counter".to_string()),
                timeout: Some(5000),
            })
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let batch = OpsDecoder::new()
        .decode(
            &BatchBuilder::new(1, 100)
                .add(7, KIND_FUNCTION, 100, "Counter")
                .build(),
        )
        .unwrap();
    fx.daemon.apply_operations("peer_a", &batch);

    let response = wait_task.await.unwrap();
    assert!(response.ok);
    let data = response.data.unwrap();
    assert_eq!(data["met"], true);
    assert_eq!(data["condition"], "component");
}

#[tokio::test]
async fn wait_component_times_out() {
    let fx = start_daemon().await;
    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client
        .request(&Request::Wait {
            condition: WaitKind::Component,
            name: Some("Never".to_string()),
            timeout: Some(100),
        })
        .await
        .unwrap();
    assert!(response.ok);
    let data = response.data.unwrap();
    assert_eq!(data["met"], false);
    assert_eq!(data["condition"], "component");
    assert_eq!(data["timeout"], true);
}

#[tokio::test]
async fn wait_connected_already_satisfied() {
    let fx = start_daemon().await;
    attach_runtime(
        &fx.daemon,
        "peer_a",
        BatchBuilder::new(1, 100).add_root().build(),
    );

    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();
    let response = client
        .request(&Request::Wait {
            condition: WaitKind::Connected,
            name: None,
            timeout: Some(100),
        })
        .await
        .unwrap();
    assert_eq!(response.data.unwrap()["met"], true);
}

#[tokio::test]
async fn profiling_flow_over_ipc() {
    let fx = start_daemon().await;
    attach_runtime(
        &fx.daemon,
        "peer_a",
        BatchBuilder::new(1, 100)
            .add_root()
            .add(1, KIND_FUNCTION, 100, "App")
            .add(2, KIND_FUNCTION, 1, "List")
            .build(),
    );

    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();

    let response = client
        .request(&Request::ProfileStart {
            name: Some("run".to_string()),
        })
        .await
        .unwrap();
    assert!(response.ok);

    // The runtime reports one commit
    fx.daemon.ingest_profiling(&json!({
        "dataForRoots": [{
            "commitData": [{
                "timestamp": 100.0,
                "duration": 15.0,
                "fiberActualDurations": [[1, 10.0], [2, 5.0]],
                "fiberSelfDurations": [[1, 4.0], [2, 5.0]],
                "changeDescriptions": [[1, {"props": ["x"]}], [2, {"isFirstMount": true}]]
            }]
        }]
    }));

    let response = client.request(&Request::ProfileStop).await.unwrap();
    assert!(response.ok);
    let summary = response.data.unwrap();
    assert_eq!(summary["name"], "run");
    assert_eq!(summary["commitCount"], 1);

    let response = client
        .request(&Request::ProfileReport {
            component_id: ComponentRef::Id(1),
        })
        .await
        .unwrap();
    let report = response.data.unwrap();
    assert_eq!(report["displayName"], "App");
    assert_eq!(report["renderCount"], 1);
    assert_eq!(report["avgDuration"], 10.0);
    assert_eq!(report["causes"], json!(["PropsChanged"]));

    let response = client
        .request(&Request::ProfileSlow { limit: Some(1) })
        .await
        .unwrap();
    let slow = response.data.unwrap();
    assert_eq!(slow[0]["id"], 1);

    let response = client
        .request(&Request::ProfileTimeline { limit: None })
        .await
        .unwrap();
    let timeline = response.data.unwrap();
    assert_eq!(timeline.as_array().unwrap().len(), 1);
    assert_eq!(timeline[0]["componentCount"], 2);

    let response = client
        .request(&Request::ProfileCommit {
            index: 0,
            limit: None,
        })
        .await
        .unwrap();
    let commit = response.data.unwrap();
    assert_eq!(commit["totalComponents"], 2);
    // Sorted by self duration descending
    assert_eq!(commit["components"][0]["id"], 2);
}

#[tokio::test]
async fn shutdown_command_triggers_broadcast() {
    let fx = start_daemon().await;
    let mut shutdown_rx = fx.daemon.subscribe_shutdown();

    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();
    let response = client.request(&Request::Shutdown).await.unwrap();
    assert!(response.ok);

    tokio::time::timeout(Duration::from_secs(1), shutdown_rx.recv())
        .await
        .expect("shutdown should be broadcast")
        .unwrap();
}

#[tokio::test]
async fn empty_tree_hint_after_disconnect() {
    let fx = start_daemon().await;
    attach_runtime(
        &fx.daemon,
        "peer_a",
        BatchBuilder::new(1, 100).add_root().build(),
    );
    fx.daemon.unregister_peer("peer_a");

    let mut client = IpcClient::connect(&fx.socket_path).await.unwrap();
    let response = client
        .request(&Request::GetTree { depth: None })
        .await
        .unwrap();
    assert!(response.ok);
    assert!(response.data.unwrap().as_array().unwrap().is_empty());
    let hint = response.hint.expect("hint should be set");
    assert!(hint.contains("app disconnected"));
}
