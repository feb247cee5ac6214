//! PollerActor - drives the recurring poll cycle
//!
//! ## Message Flow
//!
//! ```text
//! Sweep start → list_active → DeviceMonitor::poll (per device) → ISP sweep → wait until
//!     ↑                                                                   next sweep start
//!     └─── Commands (PollNow, UpdateInterval, Shutdown) and the stop signal
//! ```
//!
//! Sweeps start every `interval`, measured from the start of the previous sweep. A sweep that
//! takes longer than the interval is followed by the next one immediately. The stop signal is
//! checked between devices and while waiting; the in-flight device always completes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::{StreamExt, future, stream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{CycleReport, PollerCommand};
use crate::monitors::{DeviceMonitor, IspMonitor};

/// Default time between sweep starts
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Devices processed in parallel within a sweep
    pub concurrency: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            concurrency: 1,
        }
    }
}

/// One sweep over every active device, followed by the ISP links.
///
/// Shared by the scheduled loop, `PollNow` and single-pass mode.
#[instrument(skip_all)]
pub async fn run_sweep(
    monitor: &DeviceMonitor,
    isps: Option<&IspMonitor>,
    concurrency: usize,
    stop: &watch::Receiver<bool>,
) -> CycleReport {
    let started = Instant::now();
    let mut report = CycleReport::started(Utc::now());

    match monitor.devices().list_active().await {
        Ok(devices) => {
            let listed = devices.len();
            debug!("polling {listed} active device(s)");

            let outcomes: Vec<_> = stream::iter(devices)
                .take_while(|_| future::ready(!*stop.borrow()))
                .map(|device| monitor.poll(device))
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

            for outcome in &outcomes {
                report.record(outcome);
            }
            report.interrupted = outcomes.len() < listed;
        }
        Err(e) => error!("failed to list active devices: {e}"),
    }

    // a stop raised during the sweep still cancels the ISP links
    if *stop.borrow() {
        debug!("stop requested, skipping ISP links");
    } else if let Some(isps) = isps {
        report.record_isps(isps.sweep().await);
    }

    report.duration = started.elapsed();
    info!(
        "sweep finished in {:?}: {} polled, {} online, {} offline, {} failed, {} alert(s) raised",
        report.duration,
        report.polled,
        report.online,
        report.offline,
        report.failed,
        report.alerts_created
    );
    report
}

/// Run exactly one sweep and return its report
pub async fn run_single_pass(
    monitor: &DeviceMonitor,
    isps: Option<&IspMonitor>,
    concurrency: usize,
) -> CycleReport {
    let (_stop_tx, stop_rx) = watch::channel(false);
    run_sweep(monitor, isps, concurrency, &stop_rx).await
}

pub struct PollerActor {
    monitor: DeviceMonitor,
    isps: Option<IspMonitor>,
    command_rx: mpsc::Receiver<PollerCommand>,
    stop_rx: watch::Receiver<bool>,
    settings: PollerSettings,
}

impl PollerActor {
    pub fn new(
        monitor: DeviceMonitor,
        isps: Option<IspMonitor>,
        settings: PollerSettings,
        command_rx: mpsc::Receiver<PollerCommand>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            monitor,
            isps,
            command_rx,
            stop_rx,
            settings,
        }
    }

    fn stopped(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn sweep(&self) -> CycleReport {
        run_sweep(
            &self.monitor,
            self.isps.as_ref(),
            self.settings.concurrency,
            &self.stop_rx,
        )
        .await
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command or the stop signal arrives, or every handle is dropped.
    #[instrument(skip(self), fields(interval = ?self.settings.interval))]
    pub async fn run(mut self) {
        info!("starting poller");

        'cycles: loop {
            let cycle_start = Instant::now();
            self.sweep().await;

            if self.stopped() {
                break;
            }

            loop {
                let next_start = cycle_start + self.settings.interval;

                tokio::select! {
                    _ = sleep_until(next_start) => break,

                    changed = self.stop_rx.changed() => {
                        if changed.is_err() || self.stopped() {
                            break 'cycles;
                        }
                    }

                    Some(cmd) = self.command_rx.recv() => {
                        match cmd {
                            PollerCommand::PollNow { respond_to } => {
                                debug!("received PollNow command");
                                let report = self.sweep().await;
                                let _ = respond_to.send(report);
                                if self.stopped() {
                                    break 'cycles;
                                }
                            }

                            PollerCommand::UpdateInterval { interval_secs } => {
                                debug!("updating interval to {interval_secs}s");
                                self.settings.interval = Duration::from_secs(interval_secs.max(1));
                            }

                            PollerCommand::Shutdown => {
                                debug!("received shutdown command");
                                break 'cycles;
                            }
                        }
                    }

                    else => {
                        warn!("command channel closed, shutting down");
                        break 'cycles;
                    }
                }
            }
        }

        info!("poller stopped");
    }
}

/// Handle for controlling a PollerActor
///
/// Cloneable; every clone controls the same actor.
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl PollerHandle {
    /// Spawn the actor on the current runtime. The first sweep starts immediately.
    pub fn spawn(monitor: DeviceMonitor, isps: Option<IspMonitor>, settings: PollerSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = watch::channel(false);

        let actor = PollerActor::new(monitor, isps, settings, cmd_rx, stop_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            stop_tx: Arc::new(stop_tx),
        }
    }

    /// Run a sweep now and wait for its report.
    ///
    /// Queued behind a sweep that is already running.
    pub async fn poll_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive cycle report")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(PollerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Raise the stop signal without waiting for the actor to exit
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Stop the poller: the in-flight device completes, remaining devices are skipped
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();
        // the actor may already be gone after seeing the stop signal
        if self.sender.send(PollerCommand::Shutdown).await.is_err() {
            debug!("poller already stopped");
        }
        Ok(())
    }

    /// Resolves once the actor task has exited
    pub async fn stopped(&self) {
        self.sender.closed().await;
    }
}
