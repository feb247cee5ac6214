//! Dashboard clients over the HTTP and WebSocket API

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use netpulse::actors::run_single_pass;
use netpulse::api::{ApiState, HealthResponse, spawn_api_server};
use netpulse::config::ApiSettings;
use netpulse::events::{BroadcastPublisher, EventPublisher};
use netpulse::monitors::ThresholdPolicy;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::helpers::{Fixture, ip, load, monitor_over};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(fixture: &Fixture, bus: Arc<BroadcastPublisher>) -> SocketAddr {
    let settings = ApiSettings {
        bind: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    spawn_api_server(settings, ApiState::new(fixture.stores.clone(), bus))
        .await
        .unwrap()
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/api/v1/stream")).await.unwrap();
    client
}

async fn next_json(client: &mut Client) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("no message within 5s")
        .expect("stream ended")
        .unwrap();
    serde_json::from_str(&message.into_text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_stream_sends_initial_data_then_live_events() {
    let fixture = Fixture::new();
    fixture.add_device("edge", "10.6.0.1").await;
    fixture.prober.set_measurement(ip("10.6.0.1"), load(99.0, 10.0)).await;

    let bus = Arc::new(BroadcastPublisher::default());
    let addr = start(&fixture, bus.clone()).await;

    let mut client = connect(addr).await;
    let initial = next_json(&mut client).await;
    assert_eq!(initial["type"], "initial_data");
    assert_eq!(initial["devices_online"], 0);
    assert_eq!(initial["alerts_critical"], 0);
    assert!(initial["latest_metrics"].is_null());

    let publisher: Arc<dyn EventPublisher> = bus.clone();
    let monitor = monitor_over(
        &fixture.stores,
        &fixture.prober,
        publisher,
        ThresholdPolicy::default(),
    );
    run_single_pass(&monitor, None, 1).await;

    let mut kinds = Vec::new();
    for _ in 0..4 {
        let event = next_json(&mut client).await;
        kinds.push(event["type"].as_str().unwrap().to_string());
    }
    assert_eq!(
        kinds,
        vec!["metric_update", "alert_triggered", "alert_triggered", "device_update"]
    );

    // a late client starts from the current state
    let mut late = connect(addr).await;
    let initial = next_json(&mut late).await;
    assert_eq!(initial["devices_online"], 1);
    assert_eq!(initial["alerts_critical"], 1);
    assert_eq!(initial["latest_metrics"]["cpu_usage"], 99.0);
}

#[tokio::test]
async fn test_device_update_payload_shape() {
    let fixture = Fixture::new();
    let device = fixture.add_device("core", "10.6.0.2").await;
    fixture.prober.set_measurement(ip("10.6.0.2"), load(20.0, 10.0)).await;

    let bus = Arc::new(BroadcastPublisher::default());
    let addr = start(&fixture, bus.clone()).await;
    let mut client = connect(addr).await;
    next_json(&mut client).await;

    let monitor = monitor_over(&fixture.stores, &fixture.prober, bus, ThresholdPolicy::default());
    run_single_pass(&monitor, None, 1).await;

    assert_eq!(next_json(&mut client).await["type"], "metric_update");
    // back_online alert
    assert_eq!(next_json(&mut client).await["type"], "alert_triggered");

    let update = next_json(&mut client).await;
    assert_eq!(update["type"], "device_update");
    assert_eq!(update["change"], "back_online");
    assert_eq!(update["device"]["id"], device.id);
    assert_eq!(update["device"]["name"], "core");
    assert_eq!(update["device"]["ip"], "10.6.0.2");
    assert_eq!(update["device"]["is_online"], true);
    assert!(update.get("alert").is_none());
}

#[tokio::test]
async fn test_health_reports_stream_subscribers() {
    let fixture = Fixture::new();
    let bus = Arc::new(BroadcastPublisher::default());
    let addr = start(&fixture, bus).await;

    let mut client = connect(addr).await;
    next_json(&mut client).await;

    let health: HealthResponse = reqwest::get(format!("http://{addr}/api/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(health.status, "ok");
    assert_eq!(health.subscribers, 1);
}

#[tokio::test]
async fn test_snapshot_endpoint_matches_initial_data() {
    let fixture = Fixture::new();
    fixture.add_device("edge", "10.6.0.3").await;
    fixture.prober.set_measurement(ip("10.6.0.3"), load(30.0, 10.0)).await;
    fixture.pass().await;

    let addr = start(&fixture, Arc::new(BroadcastPublisher::default())).await;

    let snapshot: Value = reqwest::get(format!("http://{addr}/api/v1/snapshot"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(snapshot["type"], "initial_data");
    assert_eq!(snapshot["devices_online"], 1);
    assert_eq!(snapshot["alerts_critical"], 0);
    assert_eq!(snapshot["latest_metrics"]["cpu_usage"], 30.0);
}
