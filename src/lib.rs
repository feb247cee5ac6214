pub mod actors;
pub mod api;
pub mod config;
pub mod events;
pub mod monitors;
pub mod prober;
pub mod storage;
pub mod util;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Point-in-time result of probing a single device.
///
/// Consumed once per poll: its fields are projected into a metric row and
/// the device's observed state, it is never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub reachable: bool,
    pub system_name: Option<String>,
    pub uptime_secs: Option<u64>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub network_in: Option<f64>,
    pub network_out: Option<f64>,
    pub temperature: Option<f64>,
    /// Readings from custom probe targets, keyed by target name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Reading>,
}

impl Measurement {
    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn reachable() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    /// Look up a tracked metric by its policy name (`cpu_usage`, `memory_usage`, ...)
    pub fn value_of(&self, metric: &str) -> Option<f64> {
        match metric {
            "cpu_usage" => self.cpu_usage,
            "memory_usage" => self.memory_usage,
            "network_in" => self.network_in,
            "network_out" => self.network_out,
            "temperature" => self.temperature,
            other => self.extra.get(other).and_then(Reading::as_f64),
        }
    }
}

/// A single value read from a custom probe target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl Reading {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reading::Number(value) => Some(*value),
            Reading::Text(text) => text.trim().parse().ok(),
            Reading::Flag(_) => None,
        }
    }
}

impl From<f64> for Reading {
    fn from(value: f64) -> Self {
        Reading::Number(value)
    }
}

impl From<&str> for Reading {
    fn from(value: &str) -> Self {
        Reading::Text(value.to_string())
    }
}
