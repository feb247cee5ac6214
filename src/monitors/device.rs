//! Processing of a single device within a poll cycle
//!
//! For each device, in this order:
//!
//! 1. probe it (bounded by the probe timeout; a timeout is an unreachable result)
//! 2. project a reachable measurement onto the device, append a metric and publish
//!    `metric_update`, then run the threshold rules
//! 3. raise the transition alert (`device_down` / `back_online`) through the ledger
//! 4. save the device
//! 5. publish `device_update` for a transition
//!
//! Failures of the metric, alert and event steps are logged and never keep the device's own
//! status from being saved. A `ProbeError` forces the device offline without raising an alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::thresholds::ThresholdEvaluator;
use super::transition::Transition;
use crate::Measurement;
use crate::events::{
    AlertLedger, DASHBOARD_TOPIC, DeviceChange, Event, EventPublisher, publish_best_effort,
};
use crate::prober::{ProbeRequest, Prober};
use crate::storage::backend::{DeviceRegistry, MetricStore};
use crate::storage::schema::{Alert, Device, DeviceId, NewMetric};

/// Default bound on a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to one device during a pass
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOutcome {
    pub device_id: DeviceId,
    /// `None` when the probe itself failed
    pub transition: Option<Transition>,
    pub online: bool,
    pub metric_recorded: bool,
    pub alerts_created: usize,
    /// The probe errored or the device row could not be saved
    pub failed: bool,
}

impl DeviceOutcome {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            transition: None,
            online: false,
            metric_recorded: false,
            alerts_created: 0,
            failed: false,
        }
    }
}

#[derive(Clone)]
pub struct DeviceMonitor {
    prober: Arc<dyn Prober>,
    devices: Arc<dyn DeviceRegistry>,
    metrics: Arc<dyn MetricStore>,
    ledger: AlertLedger,
    thresholds: ThresholdEvaluator,
    publisher: Arc<dyn EventPublisher>,
    probe_timeout: Duration,
}

impl DeviceMonitor {
    pub fn new(
        prober: Arc<dyn Prober>,
        devices: Arc<dyn DeviceRegistry>,
        metrics: Arc<dyn MetricStore>,
        thresholds: ThresholdEvaluator,
        ledger: AlertLedger,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            prober,
            devices,
            metrics,
            ledger,
            thresholds,
            publisher,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn devices(&self) -> &Arc<dyn DeviceRegistry> {
        &self.devices
    }

    #[instrument(skip_all, fields(device = %device.name))]
    pub async fn poll(&self, mut device: Device) -> DeviceOutcome {
        let mut outcome = DeviceOutcome::new(device.id);
        let request = ProbeRequest::from(&device);

        let measurement =
            match tokio::time::timeout(self.probe_timeout, self.prober.probe(&request)).await {
                Ok(Ok(measurement)) => measurement,
                Ok(Err(e)) => {
                    error!("error polling {}: {e}", device.name);
                    outcome.failed = true;
                    device.mark_offline();
                    self.save(&device, &mut outcome).await;
                    return outcome;
                }
                Err(_) => {
                    warn!(
                        "probe of {} timed out after {:?}",
                        device.ip_address, self.probe_timeout
                    );
                    Measurement::unreachable()
                }
            };

        let transition = Transition::detect(device.is_online, measurement.reachable);
        outcome.transition = Some(transition);
        debug!("{} -> {transition:?}", device.ip_address);

        if transition.is_reachable() {
            device.record_reachable(&measurement, Utc::now());
            outcome.metric_recorded = self.record_metric(&device, &measurement).await;
            outcome.alerts_created += self.thresholds.evaluate(&device, &measurement).await.created;
        } else {
            device.mark_offline();
        }
        outcome.online = device.is_online;

        let alert = self.raise_transition_alert(transition, &device, &mut outcome).await;

        self.save(&device, &mut outcome).await;

        let change = match transition {
            Transition::CameOnline => Some(DeviceChange::BackOnline),
            Transition::WentOffline => Some(DeviceChange::WentOffline),
            Transition::UnchangedOnline | Transition::UnchangedOffline => None,
        };
        if let Some(change) = change {
            // the down event carries its alert; the back-online event does not
            let attached = alert.as_ref().filter(|_| change == DeviceChange::WentOffline);
            let event = Event::device_update(change, &device, attached);
            publish_best_effort(self.publisher.as_ref(), DASHBOARD_TOPIC, &event).await;
        }

        outcome
    }

    async fn record_metric(&self, device: &Device, measurement: &Measurement) -> bool {
        let metric = NewMetric::from_measurement(device.id, measurement, Utc::now());
        match self.metrics.append(metric).await {
            Ok(metric) => {
                let event = Event::metric_update(metric);
                publish_best_effort(self.publisher.as_ref(), DASHBOARD_TOPIC, &event).await;
                true
            }
            Err(e) => {
                error!("failed to record metric for {}: {e}", device.name);
                false
            }
        }
    }

    async fn raise_transition_alert(
        &self,
        transition: Transition,
        device: &Device,
        outcome: &mut DeviceOutcome,
    ) -> Option<Alert> {
        let new_alert = transition.alert_for(device)?;

        match transition {
            Transition::WentOffline => warn!("device {} went offline", device.name),
            _ => info!("device {} is back online", device.name),
        }

        // back-online alerts are terminal, so each recovery records its own
        let result = match transition {
            Transition::CameOnline => self
                .ledger
                .record_resolved(new_alert, &device.name)
                .await
                .map(|alert| (alert, true)),
            _ => self.ledger.get_or_create(new_alert, &device.name).await,
        };

        match result {
            Ok((alert, created)) => {
                if created {
                    outcome.alerts_created += 1;
                }
                Some(alert)
            }
            Err(e) => {
                error!("failed to create {transition:?} alert for {}: {e}", device.name);
                None
            }
        }
    }

    async fn save(&self, device: &Device, outcome: &mut DeviceOutcome) {
        if let Err(e) = self.devices.save(device).await {
            error!("failed to save device {}: {e}", device.name);
            outcome.failed = true;
        }
    }
}
