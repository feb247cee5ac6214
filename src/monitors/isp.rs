//! Upstream ISP link probing with the system `ping`
//!
//! Both the Unix (`iputils`/BSD) and Windows summary formats are understood, whatever the host
//! platform is. Bandwidth figures are not measured and stay empty.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::prober::ProbeError;
use crate::storage::backend::IspRegistry;

/// Echo requests sent per probe
pub const PING_COUNT: u32 = 4;

/// Per-reply wait
pub const PING_TIMEOUT: Duration = Duration::from_secs(2);

static UNIX_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)% packet loss").expect("valid regex"));
static UNIX_RTT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:rtt|round-trip) [^=]+= ([0-9./]+) ms").expect("valid regex"));
static WINDOWS_LOSS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Lost = \d+ \((\d+)% loss\)").expect("valid regex"));
static WINDOWS_AVG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Average = (\d+)ms").expect("valid regex"));

/// Summary of one ping run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingReport {
    pub latency_ms: Option<f64>,
    pub packet_loss: Option<f64>,
}

/// Extract packet loss and average round-trip time from `ping` output
pub fn parse_ping_output(output: &str) -> PingReport {
    let capture = |re: &Regex| {
        re.captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    };

    let packet_loss = capture(&UNIX_LOSS)
        .or_else(|| capture(&WINDOWS_LOSS))
        .and_then(|loss| loss.parse().ok());

    // min/avg/max[/mdev]
    let unix_avg = capture(&UNIX_RTT).and_then(|rtt| rtt.split('/').nth(1)?.parse().ok());
    let latency_ms = unix_avg.or_else(|| capture(&WINDOWS_AVG).and_then(|avg| avg.parse().ok()));

    PingReport {
        latency_ms,
        packet_loss,
    }
}

#[async_trait]
pub trait IspProber: Send + Sync {
    async fn ping(&self, host: &str) -> Result<PingReport, ProbeError>;
}

/// Runs the platform `ping` binary
#[derive(Debug, Clone)]
pub struct PingProber {
    count: u32,
    timeout: Duration,
}

impl Default for PingProber {
    fn default() -> Self {
        Self {
            count: PING_COUNT,
            timeout: PING_TIMEOUT,
        }
    }
}

impl PingProber {
    fn command(&self, host: &str) -> Command {
        let mut command = Command::new("ping");
        if cfg!(windows) {
            command
                .arg(host)
                .arg("-n")
                .arg(self.count.to_string())
                .arg("-w")
                .arg(self.timeout.as_millis().to_string());
        } else {
            command
                .arg("-c")
                .arg(self.count.to_string())
                .arg("-W")
                .arg(self.timeout.as_secs().max(1).to_string())
                .arg(host);
        }
        command.kill_on_drop(true);
        command
    }

    /// Upper bound for one whole run
    fn deadline(&self) -> Duration {
        self.timeout * (self.count + 1)
    }
}

#[async_trait]
impl IspProber for PingProber {
    async fn ping(&self, host: &str) -> Result<PingReport, ProbeError> {
        if host.trim().is_empty() || host.starts_with('-') {
            return Err(ProbeError::InvalidTarget(host.to_string()));
        }

        let output = tokio::time::timeout(self.deadline(), self.command(host).output())
            .await
            .map_err(|_| ProbeError::Client(format!("ping {host} timed out")))?
            .map_err(|e| ProbeError::Client(format!("failed to run ping: {e}")))?;

        // ping exits non-zero on loss; the summary is still worth parsing
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let report = parse_ping_output(&text);
        debug!("ping {host} -> {report:?}");
        Ok(report)
    }
}

/// Result of probing every active ISP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IspSweep {
    pub checked: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct IspMonitor {
    prober: Arc<dyn IspProber>,
    registry: Arc<dyn IspRegistry>,
}

impl IspMonitor {
    pub fn new(prober: Arc<dyn IspProber>, registry: Arc<dyn IspRegistry>) -> Self {
        Self { prober, registry }
    }

    /// Probe every active ISP once. Failures are logged per ISP.
    #[instrument(skip_all)]
    pub async fn sweep(&self) -> IspSweep {
        let mut sweep = IspSweep::default();

        let isps = match self.registry.list_active_isps().await {
            Ok(isps) => isps,
            Err(e) => {
                error!("failed to list ISPs: {e}");
                return sweep;
            }
        };

        for mut isp in isps {
            info!("probing ISP {} ({})", isp.name, isp.host);

            let report = match self.prober.ping(&isp.host).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("error probing ISP {}: {e}", isp.name);
                    sweep.failed += 1;
                    continue;
                }
            };

            isp.last_checked = Some(Utc::now());
            isp.latency_ms = report.latency_ms;
            isp.packet_loss = report.packet_loss;
            isp.upstream_mbps = None;
            isp.downstream_mbps = None;

            match self.registry.save_isp(&isp).await {
                Ok(()) => {
                    info!(
                        "ISP {} probe result: latency={:?} packet_loss={:?}",
                        isp.name, isp.latency_ms, isp.packet_loss
                    );
                    sweep.checked += 1;
                }
                Err(e) => {
                    error!("failed to save ISP {}: {e}", isp.name);
                    sweep.failed += 1;
                }
            }
        }

        sweep
    }
}
