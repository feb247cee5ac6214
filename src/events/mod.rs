//! Real-time events pushed to dashboard subscribers
//!
//! Events are never persisted. They are serialized as JSON objects tagged with `type`:
//!
//! - `device_update`: a device went offline or came back (`change` = `went_offline` |
//!   `back_online`), with the alert that was raised for it when there is one
//! - `metric_update`: a metric row was appended
//! - `alert_triggered`: an alert was created

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::schema::{Alert, AlertId, AlertSeverity, AlertStatus, Device, DeviceId, Metric};

pub mod ledger;
pub mod publisher;
pub mod webhook;

pub use ledger::AlertLedger;
pub use publisher::{
    BroadcastPublisher, EventPublisher, FanoutPublisher, PublishError, RecordingPublisher,
    publish_best_effort,
};
pub use webhook::WebhookPublisher;

/// Topic every poller event is published on
pub const DASHBOARD_TOPIC: &str = "dashboard_updates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceChange {
    BackOnline,
    WentOffline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    pub name: String,
    pub ip: IpAddr,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&Device> for DeviceSummary {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            name: device.name.clone(),
            ip: device.ip_address,
            is_online: device.is_online,
            last_seen: device.last_seen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub device_name: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl AlertSummary {
    pub fn new(alert: &Alert, device_name: &str) -> Self {
        Self {
            id: alert.id,
            device_id: alert.device_id,
            device_name: device_name.to_string(),
            title: alert.title.clone(),
            description: alert.description.clone(),
            severity: alert.severity,
            status: alert.status,
            created_at: alert.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DeviceUpdate {
        change: DeviceChange,
        device: DeviceSummary,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alert: Option<AlertSummary>,
    },
    MetricUpdate {
        metrics: Vec<Metric>,
    },
    AlertTriggered {
        alert: AlertSummary,
    },
}

impl Event {
    pub fn device_update(change: DeviceChange, device: &Device, alert: Option<&Alert>) -> Self {
        Event::DeviceUpdate {
            change,
            device: DeviceSummary::from(device),
            alert: alert.map(|alert| AlertSummary::new(alert, &device.name)),
        }
    }

    pub fn metric_update(metric: Metric) -> Self {
        Event::MetricUpdate {
            metrics: vec![metric],
        }
    }

    pub fn alert_triggered(alert: &Alert, device_name: &str) -> Self {
        Event::AlertTriggered {
            alert: AlertSummary::new(alert, device_name),
        }
    }

    /// Wire name of the event, as found in its `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Event::DeviceUpdate { .. } => "device_update",
            Event::MetricUpdate { .. } => "metric_update",
            Event::AlertTriggered { .. } => "alert_triggered",
        }
    }
}
