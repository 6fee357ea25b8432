//! Unit tests for the ready-made conditions.

use std::net::SocketAddr;
use std::time::Duration;

use rstest::rstest;
use tokio::net::TcpListener;

use super::*;
use crate::backend::SnapshotRequest;
use crate::poll::{PollOutcome, PollPolicy, Poller};
use crate::test_support::FakeBackend;

fn policy(max_wait_ms: u64, period_ms: u64) -> PollPolicy {
    PollPolicy::new(
        Duration::from_millis(max_wait_ms),
        Duration::from_millis(period_ms),
    )
    .expect("policy should be valid")
}

#[tokio::test(start_paused = true)]
async fn server_status_is_waits_for_target_status() {
    let backend = FakeBackend::new();
    let handle = backend.insert_server(
        "web",
        "fr-par-1",
        vec![
            ServerStatus::Starting,
            ServerStatus::Starting,
            ServerStatus::Running,
        ],
    );

    let outcome = Poller::new(
        ServerStatusIs::new(&backend, ServerStatus::Running),
        policy(10_000, 1_000),
    )
    .wait(handle.clone())
    .await
    .expect("status checks should not fail");

    assert_eq!(outcome, PollOutcome::Success(handle));
    assert_eq!(backend.read_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn server_status_is_times_out_when_stuck() {
    let backend = FakeBackend::new();
    let handle = backend.insert_server("web", "fr-par-1", vec![ServerStatus::Starting]);

    let outcome = Poller::new(
        ServerStatusIs::new(&backend, ServerStatus::Running),
        policy(3_000, 1_000),
    )
    .wait(handle)
    .await
    .expect("status checks should not fail");

    assert_eq!(outcome, PollOutcome::TimedOut);
}

#[tokio::test]
async fn server_status_is_reports_missing_server() {
    let backend = FakeBackend::new();
    let handle = ServerHandle {
        id: String::from("srv-404"),
        zone: String::from("fr-par-1"),
    };
    let mut condition = ServerStatusIs::new(&backend, ServerStatus::Running);

    let err = condition
        .check(&handle)
        .await
        .expect_err("missing server should fail the check");

    assert!(matches!(
        err,
        ConditionError::ServerMissing { ref server_id, expected: ServerStatus::Running }
            if server_id == "srv-404"
    ));
}

#[tokio::test(start_paused = true)]
async fn backend_failure_aborts_wait() {
    let backend = FakeBackend::new();
    let handle = backend.insert_server("web", "fr-par-1", vec![ServerStatus::Starting]);
    backend.fail_reads_after(2);

    let err = Poller::new(
        ServerStatusIs::new(&backend, ServerStatus::Running),
        policy(60_000, 1_000),
    )
    .wait(handle)
    .await
    .expect_err("third read should fail");

    assert!(matches!(err, ConditionError::Backend(_)));
    assert_eq!(backend.read_count(), 3);
}

#[tokio::test]
async fn all_servers_status_is_requires_every_server() {
    let backend = FakeBackend::new();
    let ready = backend.insert_server("a", "fr-par-1", vec![ServerStatus::Running]);
    let booting = backend.insert_server(
        "b",
        "nl-ams-1",
        vec![ServerStatus::Starting, ServerStatus::Running],
    );
    let handles = vec![ready, booting];
    let mut condition = AllServersStatusIs::new(&backend, ServerStatus::Running);

    let first = condition.check(&handles).await.expect("check should run");
    let second = condition.check(&handles).await.expect("check should run");

    assert!(!first);
    assert!(second);
}

#[tokio::test]
async fn all_servers_status_is_reports_missing_member() {
    let backend = FakeBackend::new();
    let ready = backend.insert_server("a", "fr-par-1", vec![ServerStatus::Running]);
    let ghost = ServerHandle {
        id: String::from("srv-ghost"),
        zone: String::from("fr-par-1"),
    };
    let handles = vec![ready, ghost];
    let mut condition = AllServersStatusIs::new(&backend, ServerStatus::Running);

    let err = condition
        .check(&handles)
        .await
        .expect_err("missing member should fail");

    assert!(matches!(err, ConditionError::ServerMissing { ref server_id, .. } if server_id == "srv-ghost"));
}

#[tokio::test]
async fn all_servers_status_is_reports_missing_member_behind_booting_server() {
    let backend = FakeBackend::new();
    let booting = backend.insert_server("a", "fr-par-1", vec![ServerStatus::Starting]);
    let ghost = ServerHandle {
        id: String::from("srv-ghost"),
        zone: String::from("fr-par-1"),
    };
    let handles = vec![booting, ghost];
    let mut condition = AllServersStatusIs::new(&backend, ServerStatus::Running);

    let err = condition
        .check(&handles)
        .await
        .expect_err("missing member should fail even while others boot");

    assert!(matches!(err, ConditionError::ServerMissing { ref server_id, .. } if server_id == "srv-ghost"));
}

#[tokio::test]
async fn servers_gone_tracks_deletions() {
    let backend = FakeBackend::new();
    let first = backend.insert_server("a", "fr-par-1", vec![ServerStatus::Running]);
    let second = backend.insert_server("b", "fr-par-1", vec![ServerStatus::Running]);
    let handles = vec![first.clone(), second.clone()];
    let mut condition = ServersGone::new(&backend);

    assert!(!condition.check(&handles).await.expect("check should run"));

    backend
        .delete_server(&first)
        .await
        .expect("delete should succeed");
    assert!(!condition.check(&handles).await.expect("check should run"));

    backend
        .delete_server(&second)
        .await
        .expect("delete should succeed");
    assert!(condition.check(&handles).await.expect("check should run"));
}

fn snapshot_request() -> SnapshotRequest {
    SnapshotRequest {
        name: String::from("backup"),
        volume_id: String::from("vol-1"),
        zone: String::from("fr-par-1"),
        project_id: String::from("project"),
        description: None,
    }
}

#[rstest]
#[case(vec![SnapshotStatus::Available], true)]
#[case(vec![SnapshotStatus::Creating], false)]
#[case(vec![SnapshotStatus::Other(String::from("importing"))], false)]
#[tokio::test]
async fn snapshot_available_reads_status(
    #[case] statuses: Vec<SnapshotStatus>,
    #[case] expected: bool,
) {
    let backend = FakeBackend::new();
    backend.set_new_snapshot_statuses(statuses);
    let handle = backend
        .create_snapshot(&snapshot_request())
        .await
        .expect("snapshot should be created");
    let mut condition = SnapshotAvailable::new(&backend);

    let available = condition.check(&handle).await.expect("check should run");

    assert_eq!(available, expected);
}

#[tokio::test]
async fn snapshot_available_fails_on_provider_error_state() {
    let backend = FakeBackend::new();
    backend.set_new_snapshot_statuses(vec![SnapshotStatus::Failed]);
    let handle = backend
        .create_snapshot(&snapshot_request())
        .await
        .expect("snapshot should be created");
    let mut condition = SnapshotAvailable::new(&backend);

    let err = condition
        .check(&handle)
        .await
        .expect_err("failed snapshot should abort");

    assert!(matches!(err, ConditionError::SnapshotFailed { .. }));
}

#[tokio::test]
async fn tcp_reachable_detects_listener() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener should have address");
    let mut condition = TcpReachable::new();

    let reachable = condition.check(&address).await.expect("check is infallible");

    assert!(reachable);
}

#[tokio::test]
async fn tcp_reachable_treats_refusal_as_not_yet() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address: SocketAddr = listener.local_addr().expect("listener should have address");
    drop(listener);
    let mut condition = TcpReachable::with_connect_timeout(Duration::from_millis(500));

    let reachable = condition.check(&address).await.expect("check is infallible");

    assert!(!reachable);
}
