use crate::storage::schema::{AlertSeverity, Device, NewAlert};

/// Condition key of the alert raised when a device stops responding
pub const DEVICE_DOWN: &str = "device_down";

/// Condition key of the alert raised when a device answers again
pub const BACK_ONLINE: &str = "back_online";

/// Change of a device's reachability between two polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    UnchangedOnline,
    UnchangedOffline,
    CameOnline,
    WentOffline,
}

impl Transition {
    pub fn detect(was_online: bool, reachable: bool) -> Transition {
        match (was_online, reachable) {
            (true, true) => Transition::UnchangedOnline,
            (false, false) => Transition::UnchangedOffline,
            (false, true) => Transition::CameOnline,
            (true, false) => Transition::WentOffline,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Transition::UnchangedOnline | Transition::CameOnline)
    }

    /// The alert this transition raises, if any
    pub fn alert_for(&self, device: &Device) -> Option<NewAlert> {
        match self {
            Transition::CameOnline => Some(NewAlert {
                device_id: device.id,
                condition: BACK_ONLINE.to_string(),
                title: format!("Device {} is back online", device.name),
                description: format!(
                    "Device {} ({}) is responding again",
                    device.name, device.ip_address
                ),
                severity: AlertSeverity::Info,
            }),
            Transition::WentOffline => Some(NewAlert {
                device_id: device.id,
                condition: DEVICE_DOWN.to_string(),
                title: format!("Device {} is down", device.name),
                description: format!(
                    "Device {} ({}) stopped responding to probes",
                    device.name, device.ip_address
                ),
                severity: AlertSeverity::Critical,
            }),
            Transition::UnchangedOnline | Transition::UnchangedOffline => None,
        }
    }
}
