//! Simulated prober for lab setups without real devices
//!
//! Addresses in `192.168.0.0/16` answer, everything else is unreachable. The flapping and load
//! state lives in a [`SimulationState`] that is injected into the prober so tests can force a
//! device down, pin its load, or reset everything between runs.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use super::{ProbeError, ProbeRequest, Prober};
use crate::{Measurement, Reading};

const BASE_CPU: f64 = 35.0;
const BASE_MEMORY: f64 = 45.0;
const BASE_TEMPERATURE: f64 = 38.0;

#[derive(Debug, Clone, Default)]
struct SimulatedDevice {
    forced_down: bool,
    pinned_cpu: Option<f64>,
    pinned_memory: Option<f64>,
    ticks: u64,
}

/// Shared, resettable simulation state
#[derive(Debug, Clone, Default)]
pub struct SimulationState {
    devices: Arc<Mutex<HashMap<IpAddr, SimulatedDevice>>>,
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn force_down(&self, address: IpAddr, down: bool) {
        self.devices.lock().await.entry(address).or_default().forced_down = down;
    }

    /// Pin the reported cpu and memory usage of a device
    pub async fn pin_load(&self, address: IpAddr, cpu: Option<f64>, memory: Option<f64>) {
        let mut devices = self.devices.lock().await;
        let device = devices.entry(address).or_default();
        device.pinned_cpu = cpu;
        device.pinned_memory = memory;
    }

    pub async fn reset(&self) {
        self.devices.lock().await.clear();
    }

    /// Number of probes answered for an address so far
    pub async fn ticks(&self, address: IpAddr) -> u64 {
        self.devices
            .lock()
            .await
            .get(&address)
            .map(|device| device.ticks)
            .unwrap_or_default()
    }
}

fn in_lab_range(address: &IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            a == 192 && b == 168
        }
        IpAddr::V6(_) => false,
    }
}

/// Deterministic drift in `[-4, 4]` so consecutive samples differ
fn drift(ticks: u64) -> f64 {
    ((ticks % 9) as f64) - 4.0
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedProber {
    state: SimulationState,
}

impl SimulatedProber {
    pub fn new(state: SimulationState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }
}

#[async_trait]
impl Prober for SimulatedProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<Measurement, ProbeError> {
        let mut devices = self.state.devices.lock().await;
        let device = devices.entry(request.address).or_default();

        if device.forced_down || !in_lab_range(&request.address) {
            trace!("{}: simulated device unreachable", request.address);
            return Ok(Measurement::unreachable());
        }

        device.ticks += 1;
        let offset = drift(device.ticks);

        let mut measurement = Measurement {
            system_name: Some(format!("sim-{}-{}", request.device_type, request.address)),
            uptime_secs: Some(device.ticks * 30),
            cpu_usage: Some(device.pinned_cpu.unwrap_or(BASE_CPU + offset)),
            memory_usage: Some(device.pinned_memory.unwrap_or(BASE_MEMORY + offset / 2.0)),
            network_in: Some(1_000.0 + 10.0 * offset.abs()),
            network_out: Some(800.0 + 5.0 * offset.abs()),
            temperature: Some(BASE_TEMPERATURE + offset / 4.0),
            ..Measurement::reachable()
        };

        for target in &request.custom_targets {
            measurement
                .extra
                .insert(target.clone(), Reading::Number(device.ticks as f64));
        }

        Ok(measurement)
    }
}
