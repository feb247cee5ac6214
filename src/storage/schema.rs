//! Record definitions shared by every storage backend
//!
//! ## Ownership of fields
//!
//! Devices carry two kinds of fields:
//! - **Configuration** (address, credential, port, custom targets, active flag) is written by the
//!   management surface and only read by the poller.
//! - **Observed state** (`is_online`, `last_seen`, reported name, uptime, cached load snapshot)
//!   is written exclusively by the poller during a pass.
//!
//! Metrics are append-only. Alerts are created `open` by the poller; every later status change
//! belongs to the operator.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Measurement;

pub type DeviceId = i64;
pub type MetricId = i64;
pub type AlertId = i64;
pub type IspId = i64;

/// Default SNMP port
pub const DEFAULT_PROBE_PORT: u16 = 161;

/// Default SNMP community
pub const DEFAULT_CREDENTIAL: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Router,
    Switch,
    Firewall,
    #[serde(alias = "ap", alias = "access-point")]
    AccessPoint,
    Server,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Router => "router",
            DeviceType::Switch => "switch",
            DeviceType::Firewall => "firewall",
            DeviceType::AccessPoint => "access_point",
            DeviceType::Server => "server",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "router" => Ok(DeviceType::Router),
            "switch" => Ok(DeviceType::Switch),
            "firewall" => Ok(DeviceType::Firewall),
            "access_point" | "access-point" | "ap" => Ok(DeviceType::AccessPoint),
            "server" => Ok(DeviceType::Server),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

/// A monitored network device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub ip_address: IpAddr,
    pub device_type: DeviceType,

    // === Configuration ===
    pub credential: String,
    pub port: u16,
    pub custom_targets: Vec<String>,
    /// Advisory per-device interval; every active device is still polled each cycle
    pub poll_interval_secs: Option<u64>,
    pub is_active: bool,

    // === Observed state ===
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub reported_name: String,
    pub uptime_secs: u64,
    pub cpu_load: f64,
    pub memory_load: f64,
    pub temperature: Option<f64>,
}

impl Device {
    /// Project a reachable measurement onto the observed state.
    ///
    /// `last_seen` never moves backwards, even if the clock does.
    pub fn record_reachable(&mut self, measurement: &Measurement, now: DateTime<Utc>) {
        self.is_online = true;
        self.last_seen = Some(match self.last_seen {
            Some(previous) if previous > now => previous,
            _ => now,
        });

        if let Some(name) = &measurement.system_name {
            self.reported_name = name.clone();
        }
        if let Some(uptime) = measurement.uptime_secs {
            self.uptime_secs = uptime;
        }
        if let Some(cpu) = measurement.cpu_usage {
            self.cpu_load = cpu;
        }
        if let Some(memory) = measurement.memory_usage {
            self.memory_load = memory;
        }
        if measurement.temperature.is_some() {
            self.temperature = measurement.temperature;
        }
    }

    pub fn mark_offline(&mut self) {
        self.is_online = false;
    }

    /// Copy the poller-owned fields of `observed` onto this row, leaving configuration alone
    pub fn apply_observed(&mut self, observed: &Device) {
        self.is_online = observed.is_online;
        self.last_seen = observed.last_seen;
        self.reported_name = observed.reported_name.clone();
        self.uptime_secs = observed.uptime_secs;
        self.cpu_load = observed.cpu_load;
        self.memory_load = observed.memory_load;
        self.temperature = observed.temperature;
    }
}

/// Device definition as provided by the management surface or config seeding
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub name: String,
    pub ip_address: IpAddr,
    pub device_type: DeviceType,
    pub credential: String,
    pub port: u16,
    pub custom_targets: Vec<String>,
    pub poll_interval_secs: Option<u64>,
    pub is_active: bool,
}

impl NewDevice {
    pub fn new(name: impl Into<String>, ip_address: IpAddr, device_type: DeviceType) -> Self {
        Self {
            name: name.into(),
            ip_address,
            device_type,
            credential: DEFAULT_CREDENTIAL.to_string(),
            port: DEFAULT_PROBE_PORT,
            custom_targets: Vec::new(),
            poll_interval_secs: None,
            is_active: true,
        }
    }

    /// Materialize a fresh device row: offline and never seen
    pub fn into_device(self, id: DeviceId) -> Device {
        Device {
            id,
            name: self.name,
            ip_address: self.ip_address,
            device_type: self.device_type,
            credential: self.credential,
            port: self.port,
            custom_targets: self.custom_targets,
            poll_interval_secs: self.poll_interval_secs,
            is_active: self.is_active,
            is_online: false,
            last_seen: None,
            reported_name: String::new(),
            uptime_secs: 0,
            cpu_load: 0.0,
            memory_load: 0.0,
            temperature: None,
        }
    }

    /// Overwrite the configuration half of an existing row, leaving observed state alone
    pub fn apply_to(self, device: &mut Device) {
        device.name = self.name;
        device.ip_address = self.ip_address;
        device.device_type = self.device_type;
        device.credential = self.credential;
        device.port = self.port;
        device.custom_targets = self.custom_targets;
        device.poll_interval_secs = self.poll_interval_secs;
        device.is_active = self.is_active;
    }
}

/// An immutable timeseries point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    pub device_id: DeviceId,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub temperature: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMetric {
    pub device_id: DeviceId,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub temperature: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl NewMetric {
    /// Extract a metric row from a measurement; missing readings are recorded as zero
    pub fn from_measurement(
        device_id: DeviceId,
        measurement: &Measurement,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            cpu_usage: measurement.cpu_usage.unwrap_or_default(),
            memory_usage: measurement.memory_usage.unwrap_or_default(),
            network_in: measurement.network_in.unwrap_or_default(),
            network_out: measurement.network_out.unwrap_or_default(),
            temperature: measurement.temperature,
            timestamp,
        }
    }

    pub fn into_metric(self, id: MetricId) -> Metric {
        Metric {
            id,
            device_id: self.device_id,
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            network_in: self.network_in,
            network_out: self.network_out,
            temperature: self.temperature,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(format!("unknown alert severity: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertStatus {
    Open,
    InProgress,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::InProgress => "in-progress",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "in-progress" => Ok(AlertStatus::InProgress),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

/// An alert record
///
/// `condition` is the machine-readable half of the dedup key: at most one `open` alert may
/// exist per `(device_id, condition)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub device_id: DeviceId,
    pub condition: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Apply an operator status change, stamping the matching lifecycle timestamp
    pub fn transition_to(&mut self, status: AlertStatus, now: DateTime<Utc>) {
        match status {
            AlertStatus::Open => {}
            AlertStatus::InProgress => {
                self.acknowledged_at.get_or_insert(now);
            }
            AlertStatus::Resolved => {
                self.resolved_at.get_or_insert(now);
            }
        }
        self.status = status;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub device_id: DeviceId,
    pub condition: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
}

impl NewAlert {
    pub fn into_alert(self, id: AlertId, created_at: DateTime<Utc>) -> Alert {
        Alert {
            id,
            device_id: self.device_id,
            condition: self.condition,
            title: self.title,
            description: self.description,
            severity: self.severity,
            status: AlertStatus::Open,
            created_at,
            acknowledged_at: None,
            resolved_at: None,
        }
    }
}

/// An upstream ISP link probed with ping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isp {
    pub id: IspId,
    pub name: String,
    pub host: String,
    pub is_active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
    pub upstream_mbps: Option<f64>,
    pub downstream_mbps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewIsp {
    pub name: String,
    pub host: String,
    pub is_active: bool,
}

impl NewIsp {
    pub fn into_isp(self, id: IspId) -> Isp {
        Isp {
            id,
            name: self.name,
            host: self.host,
            is_active: self.is_active,
            last_checked: None,
            latency_ms: None,
            packet_loss: None,
            upstream_mbps: None,
            downstream_mbps: None,
        }
    }
}
