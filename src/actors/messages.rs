//! Message types for the poller actor
//!
//! Commands go to the actor over an mpsc channel; request/response commands carry a oneshot
//! sender for the reply.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::monitors::{DeviceOutcome, IspSweep};

/// Commands that can be sent to a PollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Run one sweep right away, outside the regular schedule
    PollNow {
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Change the interval between sweep starts.
    ///
    /// Applies to the wait that is currently in progress.
    UpdateInterval { interval_secs: u64 },

    /// Stop after the in-flight device completes
    Shutdown,
}

/// Summary of one sweep over all active devices
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub polled: usize,
    pub online: usize,
    pub offline: usize,
    pub failed: usize,
    pub metrics_recorded: usize,
    pub alerts_created: usize,
    pub isps_checked: usize,
    pub isps_failed: usize,
    /// The stop signal left at least one listed device unprocessed
    pub interrupted: bool,
}

impl CycleReport {
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &DeviceOutcome) {
        self.polled += 1;
        if outcome.online {
            self.online += 1;
        } else {
            self.offline += 1;
        }
        if outcome.failed {
            self.failed += 1;
        }
        if outcome.metric_recorded {
            self.metrics_recorded += 1;
        }
        self.alerts_created += outcome.alerts_created;
    }

    pub fn record_isps(&mut self, sweep: IspSweep) {
        self.isps_checked += sweep.checked;
        self.isps_failed += sweep.failed;
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
