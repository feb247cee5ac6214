//! Failure isolation: one device, store or publisher failing must not take the sweep down

use std::time::Duration;

use netpulse::actors::run_sweep;
use netpulse::monitors::transition::DEVICE_DOWN;
use netpulse::prober::scripted::ProbeStep;
use netpulse::storage::memory::WriteTarget;
use netpulse::storage::{DeviceRegistry, DeviceType, NewDevice};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use crate::helpers::{Fixture, healthy, ip, load};

#[tokio::test]
async fn test_probe_error_does_not_block_other_devices() {
    let fixture = Fixture::new();
    let broken = fixture.add_device("broken", "10.2.0.1").await;
    let fine = fixture.add_device("fine", "10.2.0.2").await;
    fixture
        .prober
        .set(ip("10.2.0.1"), ProbeStep::Fail("community rejected".to_string()))
        .await;
    fixture.prober.set_measurement(ip("10.2.0.2"), healthy()).await;

    let report = fixture.pass().await;

    assert_eq!(report.polled, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.online, 1);
    assert!(!fixture.device(broken.id).await.is_online);
    assert!(fixture.device(fine.id).await.is_online);
    assert_eq!(fixture.store.metric_count(fine.id).await, 1);
}

#[tokio::test]
async fn test_probe_error_forces_offline_without_alert() {
    let fixture = Fixture::new();
    let device = fixture.add_device("flaky", "10.2.0.3").await;
    let address = ip("10.2.0.3");
    fixture.prober.push(address, ProbeStep::Answer(healthy())).await;
    fixture.prober.set(address, ProbeStep::Fail("boom".to_string())).await;

    fixture.pass().await;
    assert!(fixture.device(device.id).await.is_online);
    fixture.events.clear().await;

    let report = fixture.pass().await;

    assert_eq!(report.failed, 1);
    assert!(!fixture.device(device.id).await.is_online);
    assert!(fixture.alerts_with(device.id, DEVICE_DOWN).await.is_empty());
    assert!(fixture.events.events().await.is_empty());
}

#[tokio::test]
async fn test_probe_timeout_counts_as_unreachable() {
    let fixture = Fixture::new();
    let device = fixture.add_device("slow", "10.2.0.4").await;
    let address = ip("10.2.0.4");
    fixture.prober.push(address, ProbeStep::Answer(healthy())).await;
    fixture
        .prober
        .set(address, ProbeStep::Stall(Duration::from_secs(5), healthy()))
        .await;

    fixture.pass().await;
    let report = fixture.pass().await;

    assert_eq!(report.failed, 0);
    assert_eq!(report.offline, 1);
    assert_eq!(fixture.alerts_with(device.id, DEVICE_DOWN).await.len(), 1);
}

#[tokio::test]
async fn test_metric_write_failure_keeps_device_state() {
    let fixture = Fixture::new();
    let device = fixture.add_device("edge", "10.2.0.5").await;
    fixture.prober.set_measurement(ip("10.2.0.5"), load(99.0, 10.0)).await;
    fixture.store.fail_writes(WriteTarget::MetricAppend, true).await;

    let report = fixture.pass().await;

    assert_eq!(report.metrics_recorded, 0);
    assert_eq!(report.failed, 0);
    assert!(fixture.device(device.id).await.is_online);
    assert!(fixture.events.events_of("metric_update").await.is_empty());
    // thresholds still run on the measurement
    assert_eq!(fixture.alerts_with(device.id, "cpu_usage").await.len(), 1);
}

#[tokio::test]
async fn test_alert_write_failure_still_saves_device() {
    let fixture = Fixture::new();
    let device = fixture.add_device("edge", "10.2.0.6").await;
    fixture.prober.set_measurement(ip("10.2.0.6"), load(99.0, 10.0)).await;
    fixture.store.fail_writes(WriteTarget::AlertCreate, true).await;

    let report = fixture.pass().await;

    assert_eq!(report.alerts_created, 0);
    assert!(fixture.device(device.id).await.is_online);
    assert!(fixture.alerts(device.id).await.is_empty());
    assert!(fixture.events.events_of("alert_triggered").await.is_empty());
    assert_eq!(fixture.events.events_of("device_update").await.len(), 1);
}

#[tokio::test]
async fn test_device_save_failure_is_reported() {
    let fixture = Fixture::new();
    let broken = fixture.add_device("edge", "10.2.0.7").await;
    fixture.prober.set_measurement(ip("10.2.0.7"), healthy()).await;
    fixture.store.fail_writes(WriteTarget::DeviceSave, true).await;

    let report = fixture.pass().await;

    assert_eq!(report.failed, 1);
    assert!(!fixture.device(broken.id).await.is_online);

    fixture.store.fail_writes(WriteTarget::DeviceSave, false).await;
    let report = fixture.pass().await;
    assert_eq!(report.failed, 0);
    assert!(fixture.device(broken.id).await.is_online);
}

#[tokio::test]
async fn test_publisher_failure_does_not_lose_state() {
    let fixture = Fixture::new();
    let device = fixture.add_device("edge", "10.2.0.8").await;
    fixture.prober.set_measurement(ip("10.2.0.8"), load(99.0, 10.0)).await;
    fixture.events.set_failing(true).await;

    let report = fixture.pass().await;

    assert_eq!(report.failed, 0);
    assert_eq!(report.metrics_recorded, 1);
    assert_eq!(fixture.alerts(device.id).await.len(), 2);
    assert!(fixture.events.events().await.is_empty());
}

#[tokio::test]
async fn test_stop_signal_skips_remaining_devices() {
    let fixture = Fixture::new();
    for n in 1..=3 {
        let address = format!("10.2.1.{n}");
        fixture.add_device(&format!("sw-{n}"), &address).await;
        fixture.prober.set_measurement(ip(&address), healthy()).await;
    }
    let (stop_tx, stop_rx) = watch::channel(false);
    stop_tx.send(true).unwrap();

    let report = run_sweep(&fixture.monitor, None, 1, &stop_rx).await;

    assert!(report.interrupted);
    assert_eq!(report.polled, 0);
    assert_eq!(fixture.prober.calls(ip("10.2.1.1")).await, 0);
}

#[tokio::test]
async fn test_stop_after_last_device_is_not_an_interruption() {
    let fixture = Fixture::new();
    let device = fixture.add_device("last", "10.2.1.9").await;
    fixture
        .prober
        .set(ip("10.2.1.9"), ProbeStep::Stall(Duration::from_millis(100), healthy()))
        .await;
    let (stop_tx, stop_rx) = watch::channel(false);

    let raise_stop = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();
    };
    let (report, _) = tokio::join!(run_sweep(&fixture.monitor, None, 1, &stop_rx), raise_stop);

    assert_eq!(report.polled, 1);
    assert_eq!(report.online, 1);
    assert!(!report.interrupted);
    assert!(fixture.device(device.id).await.is_online);
}

#[tokio::test]
async fn test_parallel_sweep_polls_every_device() {
    let fixture = Fixture::new();
    for n in 1..=8 {
        let address = format!("10.2.2.{n}");
        fixture.add_device(&format!("ap-{n}"), &address).await;
        fixture
            .prober
            .set(ip(&address), ProbeStep::Stall(Duration::from_millis(20), healthy()))
            .await;
    }
    let (_stop_tx, stop_rx) = watch::channel(false);

    let report = run_sweep(&fixture.monitor, None, 4, &stop_rx).await;

    assert_eq!(report.polled, 8);
    assert_eq!(report.online, 8);
    assert_eq!(report.metrics_recorded, 8);
}

#[tokio::test]
async fn test_deactivation_during_poll_survives_the_save() {
    let fixture = Fixture::new();
    let device = fixture.add_device("edge", "10.2.0.30").await;
    fixture
        .prober
        .set(ip("10.2.0.30"), ProbeStep::Stall(Duration::from_millis(100), healthy()))
        .await;

    let edit = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        fixture
            .stores
            .devices
            .upsert(NewDevice {
                is_active: false,
                port: 1161,
                ..NewDevice::new("edge-renamed", ip("10.2.0.30"), DeviceType::Router)
            })
            .await
            .unwrap()
    };
    let (report, _) = tokio::join!(fixture.pass(), edit);

    assert_eq!(report.online, 1);
    let stored = fixture.device(device.id).await;
    assert!(!stored.is_active);
    assert_eq!(stored.name, "edge-renamed");
    assert_eq!(stored.port, 1161);
    // observed state from the poll still lands
    assert!(stored.is_online);
    assert_eq!(stored.reported_name, "edge");
    assert!(fixture.stores.devices.list_active().await.unwrap().is_empty());
}
