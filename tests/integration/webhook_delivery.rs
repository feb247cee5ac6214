//! Events leaving the process through a webhook

use std::sync::Arc;

use netpulse::actors::run_single_pass;
use netpulse::events::{EventPublisher, FanoutPublisher, RecordingPublisher, WebhookPublisher};
use netpulse::monitors::ThresholdPolicy;
use pretty_assertions::assert_eq;
use serde_json::Value;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{Fixture, ip, load, monitor_over};

#[tokio::test]
async fn test_poll_events_are_posted_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/netpulse"))
        .and(body_partial_json(serde_json::json!({ "topic": "dashboard_updates" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(4)
        .mount(&server)
        .await;

    let fixture = Fixture::new();
    fixture.add_device("edge", "10.4.0.1").await;
    fixture.prober.set_measurement(ip("10.4.0.1"), load(99.0, 10.0)).await;

    let webhook = WebhookPublisher::new(format!("{}/hooks/netpulse", server.uri()));
    let publishers: Vec<Arc<dyn EventPublisher>> =
        vec![Arc::new(fixture.events.clone()), Arc::new(webhook)];
    let publisher: Arc<dyn EventPublisher> = Arc::new(FanoutPublisher::new(publishers));
    let monitor = monitor_over(
        &fixture.stores,
        &fixture.prober,
        publisher,
        ThresholdPolicy::default(),
    );

    run_single_pass(&monitor, None, 1).await;

    let requests = server.received_requests().await.unwrap();
    let kinds: Vec<String> = requests
        .iter()
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            body["data"]["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["metric_update", "alert_triggered", "alert_triggered", "device_update"]
    );
    assert_eq!(fixture.events.events().await.len(), 4);
}

#[tokio::test]
async fn test_failing_webhook_does_not_stop_other_publishers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fixture = Fixture::new();
    let device = fixture.add_device("edge", "10.4.0.2").await;
    fixture.prober.set_measurement(ip("10.4.0.2"), load(99.0, 10.0)).await;

    let recorder = RecordingPublisher::new();
    let publishers: Vec<Arc<dyn EventPublisher>> = vec![
        Arc::new(WebhookPublisher::new(server.uri())),
        Arc::new(recorder.clone()),
    ];
    let publisher: Arc<dyn EventPublisher> = Arc::new(FanoutPublisher::new(publishers));
    let monitor = monitor_over(
        &fixture.stores,
        &fixture.prober,
        publisher,
        ThresholdPolicy::default(),
    );

    let report = run_single_pass(&monitor, None, 1).await;

    assert_eq!(report.failed, 0);
    assert_eq!(recorder.events_of("alert_triggered").await.len(), 2);
    assert_eq!(fixture.alerts(device.id).await.len(), 2);
}
