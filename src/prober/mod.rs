//! Device probing
//!
//! A [`Prober`] turns a [`ProbeRequest`] into a point-in-time [`Measurement`]. Ordinary
//! unreachability is a successful probe with `reachable = false`; an `Err` is reserved for
//! requests that can never succeed (bad configuration, client construction failures).

use std::net::IpAddr;

use async_trait::async_trait;

use crate::Measurement;
use crate::storage::schema::{Device, DeviceType};

pub mod http;
pub mod simulated;
pub mod scripted;

pub use http::HttpProber;
pub use scripted::StaticProber;
pub use simulated::{SimulatedProber, SimulationState};

/// Everything a prober needs to reach a device
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub address: IpAddr,
    pub device_type: DeviceType,
    pub credential: String,
    pub port: u16,
    pub custom_targets: Vec<String>,
}

impl From<&Device> for ProbeRequest {
    fn from(device: &Device) -> Self {
        Self {
            address: device.ip_address,
            device_type: device.device_type,
            credential: device.credential.clone(),
            port: device.port,
            custom_targets: device.custom_targets.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// A custom probe target could not be interpreted
    #[error("invalid probe target {0:?}")]
    InvalidTarget(String),

    #[error("address {0} cannot be probed")]
    InvalidAddress(IpAddr),

    /// The underlying client could not be built or used
    #[error("probe client error: {0}")]
    Client(String),
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> Result<Measurement, ProbeError>;
}
