//! Store traits consumed by the poller
//!
//! The poller never talks to a database directly. It reads and writes through four narrow
//! traits so that the in-memory backend, the SQLite backend, or a test double can be swapped in.
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync` as they are shared across the poller's per-device
//! tasks.
//!
//! ## Dedup guarantee
//!
//! `AlertStore::create` must reject a second `open` alert for the same `(device_id, condition)`
//! with `StorageError::Conflict`. That rule is what keeps concurrent get-or-create calls from
//! producing duplicates.

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{
    Alert, AlertId, AlertSeverity, AlertStatus, Device, DeviceId, Isp, Metric, NewAlert,
    NewDevice, NewIsp, NewMetric,
};

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Snapshot of every device with `is_active = true`
    async fn list_active(&self) -> StorageResult<Vec<Device>>;

    async fn get(&self, id: DeviceId) -> StorageResult<Device>;

    /// Persist the observed state of a device.
    ///
    /// Configuration columns are owned by the management surface and are never written here,
    /// so an edit made while the device was being probed survives the poller's save.
    async fn save(&self, device: &Device) -> StorageResult<()>;

    /// Insert a device, or update the configuration of the one with the same address
    async fn upsert(&self, device: NewDevice) -> StorageResult<Device>;

    async fn count_online(&self) -> StorageResult<usize>;
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn append(&self, metric: NewMetric) -> StorageResult<Metric>;

    /// Most recent metrics first, optionally restricted to one device
    async fn latest(&self, device_id: Option<DeviceId>, limit: usize) -> StorageResult<Vec<Metric>>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_open(&self, device_id: DeviceId, condition: &str) -> StorageResult<Option<Alert>>;

    /// Create an `open` alert, or fail with `Conflict` if one already exists for the key
    async fn create(&self, alert: NewAlert) -> StorageResult<Alert>;

    async fn set_status(&self, id: AlertId, status: AlertStatus) -> StorageResult<Alert>;

    /// All alerts of a device, newest first
    async fn list_for_device(&self, device_id: DeviceId) -> StorageResult<Vec<Alert>>;

    async fn count_open(&self, severity: Option<AlertSeverity>) -> StorageResult<usize>;
}

#[async_trait]
pub trait IspRegistry: Send + Sync {
    async fn list_active_isps(&self) -> StorageResult<Vec<Isp>>;

    async fn save_isp(&self, isp: &Isp) -> StorageResult<()>;

    /// Insert an ISP, or update the host/active flag of the one with the same name
    async fn upsert_isp(&self, isp: NewIsp) -> StorageResult<Isp>;
}
