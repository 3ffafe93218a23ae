//! Reload and stats against a mock control socket.

use std::time::{Duration, Instant};

use tokio::net::UnixListener;

use libproxy_gateway::control::{ReloadPath, StatsReport};
use libproxy_gateway::gateway::PublishError;
use libproxy_gateway::lifecycle::signals::spawn_republish;
use libproxy_gateway::lifecycle::startup::build_gateway_with_clock;

mod common;
use common::{acme, start_mock_control_socket, Harness};

#[tokio::test]
async fn test_reload_over_control_socket() {
    let h = Harness::new("sock");
    let seen = start_mock_control_socket(&h.config.haproxy.socket_path, "Reload OK\n");

    let mutation = h.gateway.resources.create(acme()).await.unwrap();
    assert_eq!(mutation.warning, None);

    let outcome = h.gateway.publisher().last_outcome().unwrap();
    assert_eq!(outcome.reload_path, Some(ReloadPath::Socket));
    assert_eq!(seen.lock().unwrap().as_slice(), ["reload"]);

    let applied = h.gateway.publisher().last_applied().unwrap();
    assert_eq!(applied.reload_path, ReloadPath::Socket);
}

#[tokio::test]
async fn test_missing_ack_is_reload_failure_without_fallback() {
    let dir = common::scratch_dir("noack");
    let mut config = common::test_config(&dir);
    // the fallback would fail loudly if it were attempted
    config.haproxy.service_manager = "false".into();
    let h = Harness::with_config(dir, config);
    start_mock_control_socket(&h.config.haproxy.socket_path, "Unknown command.\n");

    let mutation = h.gateway.resources.create(acme()).await.unwrap();
    let warning = mutation.warning.unwrap();
    assert!(warning.contains("did not acknowledge reload"), "{}", warning);

    let outcome = h.gateway.publisher().last_outcome().unwrap();
    assert!(matches!(outcome.failure, Some(PublishError::Reload(_))));
    assert!(h.gateway.status().await.publish.stale);
}

#[tokio::test]
async fn test_stats_parsed_into_records() {
    let h = Harness::new("stats");
    start_mock_control_socket(&h.config.haproxy.socket_path, "Reload OK\n");

    match h.gateway.stats().await {
        StatsReport::Available { records } => {
            assert_eq!(records.len(), 3);
            assert_eq!(records[1]["pxname"], "acme_backend");
            assert_eq!(records[1]["status"], "UP");
            assert_eq!(records[0]["qcur"], "");
        }
        other => panic!("expected stats, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stats_unavailable_without_socket() {
    let h = Harness::new("nostats");
    let report = h.gateway.stats().await;
    assert!(!report.is_available());

    let status = h.gateway.status().await;
    assert!(!status.socket_available);
    assert!(!status.stats.is_available());
}

#[tokio::test]
async fn test_status_report_counts() {
    let h = Harness::new("status");
    start_mock_control_socket(&h.config.haproxy.socket_path, "Reload OK\n");
    h.gateway.resources.create(acme()).await.unwrap();
    h.gateway.grants.request_access(1, 42).await.unwrap();

    let status = h.gateway.status().await;
    assert_eq!(status.active_resources, 1);
    assert_eq!(status.active_grants, 1);
    assert!(status.socket_available);
    assert!(!status.publish.stale);
    assert_eq!(status.publish.current, status.publish.last_applied.as_ref().map(|a| a.fingerprint));

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["stats"]["status"], "available");
    assert_eq!(json["publish"]["current"].as_str().unwrap().len(), 16);
}

#[tokio::test]
async fn test_applied_marker_survives_restart() {
    let dir = common::scratch_dir("restart");
    let mut config = common::test_config(&dir);
    config.store.snapshot_path = Some(dir.join("store.json"));
    let h = Harness::with_config(dir, config);

    h.gateway.resources.create(acme()).await.unwrap();
    let applied = h.gateway.publisher().last_applied().unwrap();

    // a second process over the same snapshot knows the proxy is current
    let restarted = build_gateway_with_clock(&h.config, h.clock.clone()).unwrap();
    let status = restarted.status().await;
    assert_eq!(status.publish.last_applied, Some(applied));
    assert!(!status.publish.stale);
}

#[tokio::test]
async fn test_background_republish_returns_immediately() {
    let h = Harness::new("hup");
    h.gateway.resources.create(acme()).await.unwrap();

    // accepts and never answers, so the publish waits out the socket deadline
    let listener = UnixListener::bind(&h.config.haproxy.socket_path).unwrap();
    let _silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let started = Instant::now();
    let handle = spawn_republish(h.gateway.clone(), "SIGHUP");
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!handle.is_finished());

    handle.await.unwrap();
    let outcome = h.gateway.publisher().last_outcome().unwrap();
    assert_eq!(outcome.reason, "SIGHUP");
    assert!(matches!(outcome.failure, Some(PublishError::Reload(_))));
}
