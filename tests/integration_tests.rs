// Integration tests: HTTP and WebSocket endpoints

mod common;

use axum_test::TestServer;
use common::{record, wire_json};
use ecowatch::config::AppConfig;
use ecowatch::record_repo::RecordRepo;
use ecowatch::routes;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::Duration;

fn test_app_config(db_path: &str) -> AppConfig {
    AppConfig::load_from_str(&format!(
        r#"
[server]
port = 3001
host = "0.0.0.0"

[database]
path = "{db_path}"
max_pool_size = 2

[channel]
broadcast_capacity = 16
reconnect_initial_ms = 10
reconnect_max_ms = 100
reconnect_max_attempts = 2
"#
    ))
    .unwrap()
}

/// App over a fresh database holding two records of run 7 (row ids 1 and 2).
/// The returned sender stands in for the watcher: dropping it closes the live channel.
async fn test_app(
    dir: &TempDir,
) -> (axum::Router, broadcast::Sender<String>, Arc<AtomicUsize>) {
    let db_path = dir.path().join("ecocode.db");
    let config = test_app_config(db_path.to_str().unwrap());
    let repo = RecordRepo::connect(&config.database.path, config.database.max_pool_size)
        .await
        .unwrap();
    repo.init().await.unwrap();
    repo.save_records(&[
        record("_", "7", (40.0, 0.0, 10.0), (10.0, 0.0, 1.0, 0.0)),
        record("_", "7", (60.0, 0.0, 20.0), (20.0, 0.0, 1.0, 0.0)),
    ])
    .await
    .unwrap();

    let (tx, _) = broadcast::channel(config.channel.broadcast_capacity);
    let ws_run_connections = Arc::new(AtomicUsize::new(0));
    let app = routes::app(
        tx.clone(),
        Arc::new(repo),
        ws_run_connections.clone(),
        config,
    );
    (app, tx, ws_run_connections)
}

/// Build TestServer with http_transport (required for WebSocket tests).
async fn test_server_with_http(
    dir: &TempDir,
) -> (TestServer, broadcast::Sender<String>, Arc<AtomicUsize>) {
    let (app, tx, conns) = test_app(dir).await;
    let server = TestServer::builder().http_transport().build(app);
    (server, tx, conns)
}

/// Waits until every run view has been torn down.
async fn wait_for_no_run_views(conns: &AtomicUsize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while conns.load(Ordering::Relaxed) > 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "run view still open"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_root_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _tx, _) = test_app(&dir).await;
    let server = TestServer::new(app);
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("Hello from ecowatch!");
}

#[tokio::test]
async fn test_version_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _tx, _) = test_app(&dir).await;
    let server = TestServer::new(app);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("ecowatch"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_run_aggregate_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _tx, _) = test_app(&dir).await;
    let server = TestServer::new(app);

    let response = server.get("/api/runs/7/aggregate").await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["runId"], "7");
    assert_eq!(json["recordCount"], 2);
    assert_eq!(json["totalEnergy"], 32.0);
    assert_eq!(json["avgCpuUsage"], 50.0);
    assert_eq!(json["records"][0]["id"], "1");

    let empty: Value = server.get("/api/runs/99/aggregate").await.json();
    assert_eq!(empty["recordCount"], 0);
    assert_eq!(empty["carbonFootprint"], 0.0);
}

#[tokio::test]
async fn test_run_export_csv_endpoint() {
    let dir = TempDir::new().unwrap();
    let (app, _tx, _) = test_app(&dir).await;
    let server = TestServer::new(app);

    let response = server.get("/api/runs/7/export.csv").await;
    response.assert_status_ok();
    let content_type = response.header("content-type");
    assert!(content_type.to_str().unwrap().starts_with("text/csv"));
    let disposition = response.header("content-disposition");
    assert!(disposition.to_str().unwrap().contains("run-7.csv"));
    let body = response.text();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Timestamp,PID"));
}

#[tokio::test]
async fn test_ws_run_sends_snapshot_then_updates() {
    let dir = TempDir::new().unwrap();
    let (server, tx, _) = test_server_with_http(&dir).await;
    let mut ws = server
        .get_websocket("/ws/runs/7")
        .await
        .into_websocket()
        .await;

    let snapshot: Value = ws.receive_json().await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["aggregate"]["recordCount"], 2);
    assert_eq!(snapshot["aggregate"]["avgCpuUsage"], 50.0);

    // Already in the snapshot, another run, unreadable: none produce an update.
    let _ = tx.send(wire_json(1, 7, 99.0, 99.0));
    let _ = tx.send(wire_json(11, 8, 99.0, 99.0));
    let _ = tx.send("not json".to_string());
    let _ = tx.send(wire_json(10, 7, 80.0, 5.0));

    let update: Value = ws.receive_json().await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["record"]["id"], "10");
    assert_eq!(update["record"]["runId"], "7");
    assert_eq!(update["summary"]["recordCount"], 3);
    assert_eq!(update["summary"]["avgCpuUsage"], 60.0);
    assert_eq!(update["summary"]["totalEnergy"], 38.0);
    assert!(update["summary"].get("records").is_none());
}

#[tokio::test]
async fn test_ws_run_empty_run_gets_updates_in_order() {
    let dir = TempDir::new().unwrap();
    let (server, tx, _) = test_server_with_http(&dir).await;
    let mut ws = server
        .get_websocket("/ws/runs/42")
        .await
        .into_websocket()
        .await;

    let snapshot: Value = ws.receive_json().await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["aggregate"]["recordCount"], 0);

    let _ = tx.send(wire_json(20, 42, 10.0, 1.0));
    let _ = tx.send(format!("New Project: {}", wire_json(21, 42, 30.0, 1.0)));

    let first: Value = ws.receive_json().await;
    let second: Value = ws.receive_json().await;
    assert_eq!(first["record"]["id"], "20");
    assert_eq!(first["summary"]["recordCount"], 1);
    assert_eq!(second["record"]["id"], "21");
    assert_eq!(second["summary"]["recordCount"], 2);
    assert_eq!(second["summary"]["avgCpuUsage"], 20.0);
}

#[tokio::test]
async fn test_ws_run_reports_connection_loss_and_closes() {
    let dir = TempDir::new().unwrap();
    let (server, tx, conns) = test_server_with_http(&dir).await;
    let mut ws = server
        .get_websocket("/ws/runs/7")
        .await
        .into_websocket()
        .await;

    let snapshot: Value = ws.receive_json().await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(conns.load(Ordering::Relaxed), 1);

    // Watcher gone: the live channel closes and reconnection is refused.
    drop(tx);

    let mut frames = Vec::new();
    loop {
        let msg: Value = ws.receive_json().await;
        assert_eq!(msg["type"], "connection", "unexpected frame {msg}");
        let state = msg["state"].as_str().unwrap().to_string();
        frames.push(state.clone());
        if state == "disconnected" {
            break;
        }
        assert!(frames.len() < 5, "never reported disconnected: {frames:?}");
    }
    assert!(frames.iter().all(|s| s == "reconnecting" || s == "disconnected"));

    // Gave up after the configured attempts: the view ends.
    wait_for_no_run_views(&conns).await;
}

#[tokio::test]
async fn test_ws_run_sends_error_when_batch_load_fails() {
    let dir = TempDir::new().unwrap();
    let (server, _tx, conns) = test_server_with_http(&dir).await;

    let db_path = dir.path().join("ecocode.db");
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}", db_path.to_str().unwrap()))
        .await
        .unwrap();
    sqlx::query("DROP TABLE records").execute(&pool).await.unwrap();
    pool.close().await;

    server
        .get("/api/runs/7/aggregate")
        .await
        .assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    let mut ws = server
        .get_websocket("/ws/runs/7")
        .await
        .into_websocket()
        .await;
    let msg: Value = ws.receive_json().await;
    assert_eq!(msg["type"], "error");
    assert!(msg["message"].as_str().unwrap().contains("records"));
    wait_for_no_run_views(&conns).await;
}
