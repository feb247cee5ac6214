//! The scheduled poller, driven through its handle

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netpulse::actors::{PollerHandle, PollerSettings};
use netpulse::monitors::isp::PingReport;
use netpulse::monitors::{IspMonitor, IspProber};
use netpulse::prober::ProbeError;
use netpulse::storage::{IspRegistry, NewIsp};
use pretty_assertions::assert_eq;

use crate::helpers::{Fixture, healthy, ip};

struct FixedPing;

#[async_trait]
impl IspProber for FixedPing {
    async fn ping(&self, host: &str) -> Result<PingReport, ProbeError> {
        if host == "unreachable.example" {
            return Err(ProbeError::InvalidTarget(host.to_string()));
        }
        Ok(PingReport {
            latency_ms: Some(12.5),
            packet_loss: Some(0.0),
        })
    }
}

fn settings(interval: Duration) -> PollerSettings {
    PollerSettings {
        interval,
        concurrency: 2,
    }
}

#[tokio::test]
async fn test_scheduled_cycles_until_shutdown() {
    let fixture = Fixture::new();
    let device = fixture.add_device("core", "10.3.0.1").await;
    fixture.prober.set_measurement(ip("10.3.0.1"), healthy()).await;

    let handle = PollerHandle::spawn(
        fixture.monitor.clone(),
        None,
        settings(Duration::from_millis(100)),
    );
    tokio::time::sleep(Duration::from_millis(350)).await;

    handle.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.stopped())
        .await
        .expect("poller did not stop");

    let polled = fixture.store.metric_count(device.id).await;
    assert!(polled >= 3, "expected at least 3 cycles, got {polled}");

    // nothing runs after the actor is gone
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(fixture.store.metric_count(device.id).await, polled);
}

#[tokio::test]
async fn test_poll_now_reports_devices_and_isps() {
    let fixture = Fixture::new();
    fixture.add_device("core", "10.3.0.2").await;
    fixture.add_device("dark", "10.3.0.3").await;
    fixture.prober.set_measurement(ip("10.3.0.2"), healthy()).await;
    for (name, host) in [("fiber", "198.51.100.1"), ("backup", "unreachable.example")] {
        fixture
            .stores
            .isps
            .upsert_isp(NewIsp {
                name: name.to_string(),
                host: host.to_string(),
                is_active: true,
            })
            .await
            .unwrap();
    }
    let isps = IspMonitor::new(Arc::new(FixedPing), fixture.stores.isps.clone());

    let handle = PollerHandle::spawn(
        fixture.monitor.clone(),
        Some(isps),
        settings(Duration::from_secs(3600)),
    );

    let report = handle.poll_now().await.unwrap();

    assert_eq!(report.polled, 2);
    assert_eq!(report.online, 1);
    assert_eq!(report.offline, 1);
    assert_eq!(report.isps_checked, 1);
    assert_eq!(report.isps_failed, 1);
    assert!(!report.interrupted);

    let saved = fixture.stores.isps.list_active_isps().await.unwrap();
    let fiber = saved.iter().find(|isp| isp.name == "fiber").unwrap();
    assert_eq!(fiber.latency_ms, Some(12.5));
    assert!(fiber.last_checked.is_some());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_interval_speeds_up_polling() {
    let fixture = Fixture::new();
    let device = fixture.add_device("core", "10.3.0.4").await;
    fixture.prober.set_measurement(ip("10.3.0.4"), healthy()).await;

    let handle = PollerHandle::spawn(
        fixture.monitor.clone(),
        None,
        settings(Duration::from_secs(3600)),
    );
    // let the immediate first sweep land
    handle.poll_now().await.unwrap();
    let before = fixture.store.metric_count(device.id).await;

    handle.update_interval(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(fixture.store.metric_count(device.id).await > before);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_ends_the_actor() {
    let fixture = Fixture::new();
    let handle = PollerHandle::spawn(
        fixture.monitor.clone(),
        None,
        settings(Duration::from_secs(3600)),
    );

    handle.stop();

    tokio::time::timeout(Duration::from_secs(2), handle.stopped())
        .await
        .expect("poller did not stop");
    assert!(handle.poll_now().await.is_err());
}
