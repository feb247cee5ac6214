//! Prober for devices that run a metrics agent over HTTP
//!
//! The agent answers `GET http://{ip}:{port}/metrics` with a JSON document. The credential is
//! sent in the `X-MONITORING-SECRET` header. Connection errors, timeouts, non-2xx statuses and
//! unparsable bodies all count as "unreachable".

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::{ProbeError, ProbeRequest, Prober};
use crate::{Measurement, Reading};

pub const SECRET_HEADER: &str = "X-MONITORING-SECRET";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentPayload {
    pub system: AgentSystem,
    pub memory: Option<AgentMemory>,
    pub cpus: Option<AgentCpus>,
    pub components: Option<AgentComponents>,
    pub network: Option<AgentNetwork>,
    pub readings: BTreeMap<String, Reading>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentSystem {
    pub name: Option<String>,
    pub host_name: Option<String>,
    pub uptime: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentMemory {
    pub total: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentCpus {
    pub average_usage: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentComponents {
    pub average_temperature: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentNetwork {
    pub received: f64,
    pub transmitted: f64,
}

impl AgentPayload {
    /// Project the payload onto a measurement, keeping only the requested custom targets
    pub fn into_measurement(self, custom_targets: &[String]) -> Measurement {
        let memory_usage = self.memory.and_then(|memory| {
            (memory.total > 0).then(|| memory.used as f64 / memory.total as f64 * 100.0)
        });

        let mut readings = self.readings;
        let extra = custom_targets
            .iter()
            .filter_map(|target| readings.remove(target).map(|value| (target.clone(), value)))
            .collect();

        Measurement {
            reachable: true,
            system_name: self.system.host_name.or(self.system.name),
            uptime_secs: self.system.uptime,
            cpu_usage: self.cpus.map(|cpus| cpus.average_usage),
            memory_usage,
            network_in: self.network.as_ref().map(|network| network.received),
            network_out: self.network.as_ref().map(|network| network.transmitted),
            temperature: self
                .components
                .and_then(|components| components.average_temperature),
            extra,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    fn url(address: IpAddr, port: u16) -> String {
        match address {
            IpAddr::V4(v4) => format!("http://{v4}:{port}/metrics"),
            IpAddr::V6(v6) => format!("http://[{v6}]:{port}/metrics"),
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<Measurement, ProbeError> {
        if request.address.is_unspecified() {
            return Err(ProbeError::InvalidAddress(request.address));
        }
        if let Some(target) = request.custom_targets.iter().find(|t| t.trim().is_empty()) {
            return Err(ProbeError::InvalidTarget(target.clone()));
        }

        let url = Self::url(request.address, request.port);
        trace!("{url}: requesting metrics");

        let response = match self
            .client
            .get(&url)
            .header(SECRET_HEADER, &request.credential)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("{url}: error during request: {e}");
                return Ok(Measurement::unreachable());
            }
        };

        if !response.status().is_success() {
            debug!("{url}: agent answered with {}", response.status());
            return Ok(Measurement::unreachable());
        }

        let payload = match response.json::<AgentPayload>().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{url}: error while trying to parse the metrics: {e}");
                return Ok(Measurement::unreachable());
            }
        };

        trace!("{url}: received metrics");
        Ok(payload.into_measurement(&request.custom_targets))
    }
}
