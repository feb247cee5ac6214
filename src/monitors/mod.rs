//! Per-device and per-link monitoring logic used by the poller
//!
//! - [`transition`]: online/offline state machine
//! - [`thresholds`]: threshold alert rules
//! - [`device`]: one device's probe, record, alert, save sequence
//! - [`isp`]: upstream link probing

pub mod device;
pub mod isp;
pub mod thresholds;
pub mod transition;

pub use device::{DeviceMonitor, DeviceOutcome};
pub use isp::{IspMonitor, IspProber, IspSweep, PingProber};
pub use thresholds::{ThresholdEvaluator, ThresholdPolicy, ThresholdRule};
pub use transition::Transition;
