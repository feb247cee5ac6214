//! Prober answering from a script, for tests and dry runs

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ProbeError, ProbeRequest, Prober};
use crate::Measurement;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum ProbeStep {
    Answer(Measurement),
    /// Fail with `ProbeError::Client`
    Fail(String),
    /// Sleep before answering, to exercise probe timeouts
    Stall(Duration, Measurement),
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<IpAddr, VecDeque<ProbeStep>>,
    fallback: HashMap<IpAddr, ProbeStep>,
    calls: HashMap<IpAddr, usize>,
}

/// Queued steps are consumed first; afterwards the fallback for the address repeats.
/// Addresses without any script are unreachable.
#[derive(Debug, Clone, Default)]
pub struct StaticProber {
    script: Arc<Mutex<Script>>,
}

impl StaticProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every probe of `address` with `step` until changed
    pub async fn set(&self, address: IpAddr, step: ProbeStep) {
        self.script.lock().await.fallback.insert(address, step);
    }

    pub async fn set_measurement(&self, address: IpAddr, measurement: Measurement) {
        self.set(address, ProbeStep::Answer(measurement)).await;
    }

    /// Answer the next probe of `address` with `step`
    pub async fn push(&self, address: IpAddr, step: ProbeStep) {
        self.script
            .lock()
            .await
            .queued
            .entry(address)
            .or_default()
            .push_back(step);
    }

    pub async fn calls(&self, address: IpAddr) -> usize {
        self.script
            .lock()
            .await
            .calls
            .get(&address)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Prober for StaticProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<Measurement, ProbeError> {
        let step = {
            let mut script = self.script.lock().await;
            *script.calls.entry(request.address).or_default() += 1;

            let queued = script
                .queued
                .get_mut(&request.address)
                .and_then(VecDeque::pop_front);
            queued.or_else(|| script.fallback.get(&request.address).cloned())
        };

        match step {
            None => Ok(Measurement::unreachable()),
            Some(ProbeStep::Answer(measurement)) => Ok(measurement),
            Some(ProbeStep::Fail(reason)) => Err(ProbeError::Client(reason)),
            Some(ProbeStep::Stall(delay, measurement)) => {
                tokio::time::sleep(delay).await;
                Ok(measurement)
            }
        }
    }
}
