//! In-memory storage backend (no persistence)
//!
//! This backend keeps every table in process memory behind a single `RwLock`.
//! It's useful for:
//! - Testing without database dependencies
//! - Running the poller with `storage.backend = "none"`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited history**: Metrics are kept in a ring buffer per device
//!
//! ## Failure injection
//!
//! Tests can make a class of writes fail with [`MemoryStore::fail_writes`] to exercise the
//! poller's persistence-failure handling.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::backend::{AlertStore, DeviceRegistry, IspRegistry, MetricStore};
use super::error::{StorageError, StorageResult};
use super::schema::{
    Alert, AlertId, AlertSeverity, AlertStatus, Device, DeviceId, Isp, IspId, Metric, NewAlert,
    NewDevice, NewIsp, NewMetric,
};

/// Maximum metrics to keep in memory per device
const MAX_METRICS_PER_DEVICE: usize = 1000;

/// Write paths that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteTarget {
    DeviceSave,
    MetricAppend,
    AlertCreate,
}

#[derive(Debug, Default)]
struct Tables {
    devices: BTreeMap<DeviceId, Device>,
    metrics: HashMap<DeviceId, VecDeque<Metric>>,
    alerts: BTreeMap<AlertId, Alert>,
    isps: BTreeMap<IspId, Isp>,
    next_device_id: DeviceId,
    next_metric_id: i64,
    next_alert_id: AlertId,
    next_isp_id: IspId,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// In-memory implementation of every store trait
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: RwLock<HashSet<WriteTarget>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes to `target` fail (or succeed again) until toggled back
    pub async fn fail_writes(&self, target: WriteTarget, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(target);
        } else {
            set.remove(&target);
        }
    }

    async fn check_writable(&self, target: WriteTarget) -> StorageResult<()> {
        if self.failing.read().await.contains(&target) {
            return Err(StorageError::Unavailable(format!(
                "{target:?} writes are disabled"
            )));
        }
        Ok(())
    }

    /// Total number of metrics held for a device
    pub async fn metric_count(&self, device_id: DeviceId) -> usize {
        self.tables
            .read()
            .await
            .metrics
            .get(&device_id)
            .map(VecDeque::len)
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn list_active(&self) -> StorageResult<Vec<Device>> {
        let tables = self.tables.read().await;
        Ok(tables
            .devices
            .values()
            .filter(|device| device.is_active)
            .cloned()
            .collect())
    }

    async fn get(&self, id: DeviceId) -> StorageResult<Device> {
        self.tables
            .read()
            .await
            .devices
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound {
                entity: "device",
                id,
            })
    }

    async fn save(&self, device: &Device) -> StorageResult<()> {
        self.check_writable(WriteTarget::DeviceSave).await?;

        let mut tables = self.tables.write().await;
        let Some(row) = tables.devices.get_mut(&device.id) else {
            return Err(StorageError::NotFound {
                entity: "device",
                id: device.id,
            });
        };
        row.apply_observed(device);
        trace!("saved device {}", device.id);
        Ok(())
    }

    async fn upsert(&self, device: NewDevice) -> StorageResult<Device> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .devices
            .values_mut()
            .find(|row| row.ip_address == device.ip_address)
        {
            device.apply_to(existing);
            return Ok(existing.clone());
        }

        let id = Tables::next_id(&mut tables.next_device_id);
        let row = device.into_device(id);
        tables.devices.insert(id, row.clone());
        debug!("registered device {} ({})", row.name, row.ip_address);
        Ok(row)
    }

    async fn count_online(&self) -> StorageResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables.devices.values().filter(|d| d.is_online).count())
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn append(&self, metric: NewMetric) -> StorageResult<Metric> {
        self.check_writable(WriteTarget::MetricAppend).await?;

        let mut tables = self.tables.write().await;
        let id = Tables::next_id(&mut tables.next_metric_id);
        let row = metric.into_metric(id);

        let series = tables.metrics.entry(row.device_id).or_default();
        if series.len() >= MAX_METRICS_PER_DEVICE {
            series.pop_front();
        }
        series.push_back(row.clone());

        Ok(row)
    }

    async fn latest(&self, device_id: Option<DeviceId>, limit: usize) -> StorageResult<Vec<Metric>> {
        let tables = self.tables.read().await;

        let mut rows: Vec<Metric> = match device_id {
            Some(id) => tables
                .metrics
                .get(&id)
                .map(|series| series.iter().cloned().collect())
                .unwrap_or_default(),
            None => tables.metrics.values().flatten().cloned().collect(),
        };

        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn find_open(&self, device_id: DeviceId, condition: &str) -> StorageResult<Option<Alert>> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .values()
            .find(|alert| {
                alert.device_id == device_id
                    && alert.condition == condition
                    && alert.status == AlertStatus::Open
            })
            .cloned())
    }

    async fn create(&self, alert: NewAlert) -> StorageResult<Alert> {
        self.check_writable(WriteTarget::AlertCreate).await?;

        // check and insert under one write lock so the open-alert rule holds
        let mut tables = self.tables.write().await;
        let duplicate = tables.alerts.values().any(|existing| {
            existing.device_id == alert.device_id
                && existing.condition == alert.condition
                && existing.status == AlertStatus::Open
        });
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "open alert already exists for device {} ({})",
                alert.device_id, alert.condition
            )));
        }

        let id = Tables::next_id(&mut tables.next_alert_id);
        let row = alert.into_alert(id, Utc::now());
        tables.alerts.insert(id, row.clone());
        Ok(row)
    }

    async fn set_status(&self, id: AlertId, status: AlertStatus) -> StorageResult<Alert> {
        let mut tables = self.tables.write().await;
        let alert = tables
            .alerts
            .get_mut(&id)
            .ok_or(StorageError::NotFound { entity: "alert", id })?;
        alert.transition_to(status, Utc::now());
        Ok(alert.clone())
    }

    async fn list_for_device(&self, device_id: DeviceId) -> StorageResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .values()
            .rev()
            .filter(|alert| alert.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn count_open(&self, severity: Option<AlertSeverity>) -> StorageResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .alerts
            .values()
            .filter(|alert| alert.status == AlertStatus::Open)
            .filter(|alert| severity.is_none_or(|s| alert.severity == s))
            .count())
    }
}

#[async_trait]
impl IspRegistry for MemoryStore {
    async fn list_active_isps(&self) -> StorageResult<Vec<Isp>> {
        let tables = self.tables.read().await;
        Ok(tables.isps.values().filter(|isp| isp.is_active).cloned().collect())
    }

    async fn save_isp(&self, isp: &Isp) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables.isps.get_mut(&isp.id) else {
            return Err(StorageError::NotFound {
                entity: "isp",
                id: isp.id,
            });
        };
        *row = isp.clone();
        Ok(())
    }

    async fn upsert_isp(&self, isp: NewIsp) -> StorageResult<Isp> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.isps.values_mut().find(|row| row.name == isp.name) {
            existing.host = isp.host;
            existing.is_active = isp.is_active;
            return Ok(existing.clone());
        }

        let id = Tables::next_id(&mut tables.next_isp_id);
        let row = isp.into_isp(id);
        tables.isps.insert(id, row.clone());
        Ok(row)
    }
}
