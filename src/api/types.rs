//! API response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::schema::Metric;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Clients currently listening on the dashboard topic
    pub subscribers: usize,
}

/// The most recent metric across all devices
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatestMetric {
    pub device_id: i64,
    pub cpu_usage: f64,
    pub network_in: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<Metric> for LatestMetric {
    fn from(metric: Metric) -> Self {
        Self {
            device_id: metric.device_id,
            cpu_usage: metric.cpu_usage,
            network_in: metric.network_in,
            timestamp: metric.timestamp,
        }
    }
}

/// Current system status, sent first on every stream connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "initial_data")]
pub struct InitialData {
    pub devices_online: usize,
    pub alerts_critical: usize,
    pub latest_metrics: Option<LatestMetric>,
}
