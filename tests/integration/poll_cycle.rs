//! End-to-end behavior of single passes over the in-memory stores

use assert_matches::assert_matches;
use netpulse::events::{DeviceChange, Event};
use netpulse::monitors::transition::{BACK_ONLINE, DEVICE_DOWN};
use netpulse::monitors::{ThresholdPolicy, ThresholdRule};
use netpulse::prober::scripted::ProbeStep;
use netpulse::storage::{
    AlertSeverity, AlertStatus, DeviceRegistry, DeviceType, MetricStore, NewDevice,
};
use pretty_assertions::assert_eq;

use crate::helpers::{Fixture, healthy, ip, load};

#[tokio::test]
async fn test_one_metric_per_reachable_poll() {
    let fixture = Fixture::new();
    let device = fixture.add_device("core-sw", "10.1.0.1").await;
    fixture.prober.set_measurement(ip("10.1.0.1"), healthy()).await;

    for _ in 0..3 {
        let report = fixture.pass().await;
        assert_eq!(report.polled, 1);
        assert_eq!(report.metrics_recorded, 1);
    }

    assert_eq!(fixture.store.metric_count(device.id).await, 3);
    assert_eq!(fixture.events.events_of("metric_update").await.len(), 3);

    let latest = fixture.stores.metrics.latest(Some(device.id), 1).await.unwrap();
    assert_eq!(latest[0].cpu_usage, 20.0);
    assert_eq!(latest[0].temperature, Some(41.5));
}

#[tokio::test]
async fn test_unreachable_devices_record_no_metrics() {
    let fixture = Fixture::new();
    let device = fixture.add_device("dark", "10.1.0.9").await;

    let report = fixture.pass().await;

    assert_eq!(report.offline, 1);
    assert_eq!(report.metrics_recorded, 0);
    assert_eq!(fixture.store.metric_count(device.id).await, 0);
    assert!(fixture.events.events().await.is_empty());
}

#[tokio::test]
async fn test_device_lifecycle_raises_transition_alerts() {
    let fixture = Fixture::new();
    let device = fixture.add_device("edge-rtr", "10.1.0.2").await;
    let address = ip("10.1.0.2");

    // never seen and still dark: nothing to report
    fixture.pass().await;
    assert!(fixture.alerts(device.id).await.is_empty());

    fixture.prober.set_measurement(address, healthy()).await;
    let report = fixture.pass().await;
    assert_eq!(report.online, 1);
    assert_eq!(report.alerts_created, 1);

    let back = fixture.alerts_with(device.id, BACK_ONLINE).await;
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].severity, AlertSeverity::Info);
    assert_eq!(back[0].title, "Device edge-rtr is back online");
    assert_eq!(back[0].status, AlertStatus::Resolved);

    let stored = fixture.device(device.id).await;
    assert!(stored.is_online);
    assert!(stored.last_seen.is_some());
    assert_eq!(stored.reported_name, "edge");

    fixture.prober.set_measurement(address, netpulse::Measurement::unreachable()).await;
    let report = fixture.pass().await;
    assert_eq!(report.offline, 1);

    let down = fixture.alerts_with(device.id, DEVICE_DOWN).await;
    assert_eq!(down.len(), 1);
    assert_eq!(down[0].severity, AlertSeverity::Critical);
    assert_eq!(down[0].status, AlertStatus::Open);
    assert_eq!(down[0].title, "Device edge-rtr is down");
    assert!(!fixture.device(device.id).await.is_online);

    // staying down does not raise another alert
    fixture.pass().await;
    assert_eq!(fixture.alerts_with(device.id, DEVICE_DOWN).await.len(), 1);

    let updates = fixture.events.events_of("device_update").await;
    assert_eq!(updates.len(), 2);
    assert_matches!(
        &updates[0],
        Event::DeviceUpdate { change: DeviceChange::BackOnline, alert: None, .. }
    );
    assert_matches!(
        &updates[1],
        Event::DeviceUpdate { change: DeviceChange::WentOffline, alert: Some(alert), device }
            if alert.title == "Device edge-rtr is down" && !device.is_online
    );
    assert_eq!(fixture.events.events_of("alert_triggered").await.len(), 2);
}

#[tokio::test]
async fn test_repeated_recovery_raises_one_back_online_alert_each() {
    let fixture = Fixture::new();
    let device = fixture.add_device("flappy", "10.1.0.4").await;
    let address = ip("10.1.0.4");

    fixture.prober.set_measurement(address, healthy()).await;
    fixture.pass().await;
    fixture.prober.set_measurement(address, netpulse::Measurement::unreachable()).await;
    fixture.pass().await;
    fixture.prober.set_measurement(address, healthy()).await;
    let report = fixture.pass().await;

    assert_eq!(report.alerts_created, 1);
    let back = fixture.alerts_with(device.id, BACK_ONLINE).await;
    assert_eq!(back.len(), 2);
    assert!(back.iter().all(|alert| alert.status == AlertStatus::Resolved));
    assert!(back.iter().all(|alert| alert.resolved_at.is_some()));
    assert_ne!(back[0].id, back[1].id);

    // one alert_triggered per recovery plus the down alert
    assert_eq!(fixture.events.events_of("alert_triggered").await.len(), 3);
}

#[tokio::test]
async fn test_events_follow_per_device_order() {
    let fixture = Fixture::new();
    fixture.add_device("edge-rtr", "10.1.0.3").await;
    fixture.prober.set_measurement(ip("10.1.0.3"), load(99.0, 10.0)).await;

    fixture.pass().await;

    let kinds: Vec<_> = fixture
        .events
        .events()
        .await
        .iter()
        .map(Event::kind)
        .collect();
    assert_eq!(
        kinds,
        vec!["metric_update", "alert_triggered", "alert_triggered", "device_update"]
    );
    assert!(fixture.events.topics().await.iter().all(|t| t == "dashboard_updates"));
}

#[tokio::test]
async fn test_threshold_alert_is_deduplicated() {
    let fixture = Fixture::new();
    let device = fixture.add_device("busy", "10.1.0.4").await;
    let address = ip("10.1.0.4");
    // stay online before the load climbs so only threshold alerts are counted
    fixture.prober.set_measurement(address, healthy()).await;
    fixture.pass().await;
    fixture.events.clear().await;

    for cpu in [90.0, 90.0, 97.0] {
        fixture.prober.push(address, ProbeStep::Answer(load(cpu, 10.0))).await;
    }
    let mut created = 0;
    for _ in 0..3 {
        created += fixture.pass().await.alerts_created;
    }
    assert_eq!(created, 1);

    let cpu = fixture.alerts_with(device.id, "cpu_usage").await;
    assert_eq!(cpu.len(), 1);
    assert_eq!(cpu[0].severity, AlertSeverity::Warning);
    assert_eq!(cpu[0].description, "cpu usage is at 90.0% (threshold: 80%)");
    assert_eq!(fixture.events.events_of("alert_triggered").await.len(), 1);
}

#[tokio::test]
async fn test_threshold_limits_are_strict() {
    let fixture = Fixture::with_policy(ThresholdPolicy {
        rules: vec![ThresholdRule::new("cpu_usage", 80.0)],
        auto_resolve: false,
    });
    let device = fixture.add_device("edge", "10.1.0.5").await;
    fixture.prober.set_measurement(ip("10.1.0.5"), load(80.0, 99.0)).await;

    fixture.pass().await;

    assert!(fixture.alerts_with(device.id, "cpu_usage").await.is_empty());
    assert!(fixture.alerts_with(device.id, "memory_usage").await.is_empty());
}

#[tokio::test]
async fn test_auto_resolve_closes_recovered_threshold_alert() {
    let fixture = Fixture::with_policy(ThresholdPolicy {
        auto_resolve: true,
        ..ThresholdPolicy::default()
    });
    let device = fixture.add_device("edge", "10.1.0.6").await;
    let address = ip("10.1.0.6");

    fixture.prober.push(address, ProbeStep::Answer(load(20.0, 96.0))).await;
    fixture.prober.set_measurement(address, healthy()).await;

    fixture.pass().await;
    let open = fixture.alerts_with(device.id, "memory_usage").await;
    assert_eq!(open[0].status, AlertStatus::Open);
    assert_eq!(open[0].severity, AlertSeverity::Critical);

    fixture.pass().await;
    let closed = fixture.alerts_with(device.id, "memory_usage").await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status, AlertStatus::Resolved);
    assert!(closed[0].resolved_at.is_some());
}

#[tokio::test]
async fn test_single_pass_twice_does_not_duplicate_alerts() {
    let fixture = Fixture::new();
    let device = fixture.add_device("edge", "10.1.0.7").await;
    fixture.prober.set_measurement(ip("10.1.0.7"), load(99.0, 99.0)).await;

    let first = fixture.pass().await;
    let second = fixture.pass().await;

    // back_online, cpu_usage and memory_usage
    assert_eq!(first.alerts_created, 3);
    assert_eq!(second.alerts_created, 0);
    assert_eq!(fixture.alerts(device.id).await.len(), 3);
    assert_eq!(fixture.store.metric_count(device.id).await, 2);
}

#[tokio::test]
async fn test_inactive_devices_are_skipped() {
    let fixture = Fixture::new();
    fixture.add_device("spare", "10.1.0.8").await;
    fixture
        .stores
        .devices
        .upsert(NewDevice {
            is_active: false,
            ..NewDevice::new("spare", ip("10.1.0.8"), DeviceType::Router)
        })
        .await
        .unwrap();
    fixture.prober.set_measurement(ip("10.1.0.8"), healthy()).await;

    let report = fixture.pass().await;

    assert_eq!(report.polled, 0);
    assert_eq!(fixture.prober.calls(ip("10.1.0.8")).await, 0);
}
