//! Integration tests for the consumer API
//!
//! - REST endpoints serve the committed state
//! - Acknowledgement goes through the scheduler and 404s on unknown ids
//! - The stream endpoint pushes every commit

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use platform_monitor::{
    api::{ApiState, spawn_api_server},
    config::ApiSettings,
    monitor::Monitor,
    sources::SourceKind,
};
use serde_json::Value;
use tokio_test::assert_ok;

use super::helpers::*;

async fn spawn_test_api(monitor: Arc<Monitor>) -> SocketAddr {
    let settings = ApiSettings {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };

    spawn_api_server(settings, ApiState::new(monitor)).await.unwrap()
}

fn test_monitor() -> (Arc<Monitor>, Arc<ScriptedSource>) {
    let system_source = ScriptedSource::new("system", SourceKind::System, vec![Ok(system(95.0, 40.0))]);
    let sources = [
        system_source.clone(),
        ScriptedSource::new("disk", SourceKind::Disk, vec![unavailable("no disk")]),
    ];
    (Arc::new(start_monitor(manual_config(), &sources)), system_source)
}

async fn get_json(addr: SocketAddr, path: &str) -> Value {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    assert!(response.status().is_success(), "{path}: {}", response.status());
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (monitor, _) = test_monitor();
    let addr = spawn_test_api(monitor.clone()).await;

    let body = get_json(addr, "/api/v1/health").await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["collecting"], true);
    assert_eq!(body["connectionStatus"], "disconnected");
    assert_eq!(body["version"], 0);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_state_and_snapshot_endpoints() {
    let (monitor, _) = test_monitor();
    let addr = spawn_test_api(monitor.clone()).await;
    assert_ok!(monitor.collect_now().await);

    let state = get_json(addr, "/api/v1/state").await;
    assert_eq!(state["version"], 1);
    assert_eq!(state["connectionStatus"], "degraded");
    assert_eq!(state["staleSources"], serde_json::json!(["disk"]));
    assert_eq!(state["snapshot"]["cpu"]["usagePercent"], 95.0);

    let snapshot = get_json(addr, "/api/v1/snapshot").await;
    assert_eq!(snapshot["memory"]["percent"], 40.0);

    let stats = get_json(addr, "/api/v1/stats").await;
    assert_eq!(stats["apiCallsCount"], 2);
    assert_eq!(stats["cacheHits"], 0);
    assert!(stats["cacheHitRatio"].is_null());

    let services = get_json(addr, "/api/v1/services").await;
    assert_eq!(services["count"], 0);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_acknowledge_alert_endpoint() {
    let (monitor, _) = test_monitor();
    let addr = spawn_test_api(monitor.clone()).await;
    assert_ok!(monitor.collect_now().await);

    let alerts = get_json(addr, "/api/v1/alerts").await;
    assert_eq!(alerts["firing"], 1);
    assert_eq!(alerts["unacknowledged"], 1);
    let id = alerts["alerts"][0]["id"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/api/v1/alerts/{id}/acknowledge"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["acknowledged"], true);

    let alerts = get_json(addr, "/api/v1/alerts").await;
    assert_eq!(alerts["firing"], 1);
    assert_eq!(alerts["unacknowledged"], 0);

    let response = client
        .post(format!("http://{addr}/api/v1/alerts/does-not-exist/acknowledge"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    monitor.shutdown().await;
}

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_state(socket: &mut Socket) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .expect("no message within 2s")
        .unwrap()
        .unwrap();
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_stream_pushes_commits() {
    let (monitor, system_source) = test_monitor();
    let addr = spawn_test_api(monitor.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/v1/stream"))
        .await
        .unwrap();

    // Current state first
    assert_eq!(next_state(&mut socket).await["version"], 0);

    system_source.respond_with(Ok(system(10.0, 20.0)));
    assert_ok!(monitor.collect_now().await);

    let pushed = next_state(&mut socket).await;
    assert_eq!(pushed["version"], 1);
    assert_eq!(pushed["snapshot"]["cpu"]["usagePercent"], 10.0);

    monitor.shutdown().await;
}
