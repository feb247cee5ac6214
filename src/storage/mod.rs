//! Persistence for devices, metrics, alerts and ISP links
//!
//! The poller talks to storage only through the traits in [`backend`]. Two implementations
//! ship with the crate:
//!
//! - **SQLite** (default, feature `storage-sqlite`): embedded database with migrations
//! - **In-Memory**: no persistence, used by tests and `storage.backend = "none"`
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use netpulse::storage::{Stores, memory::MemoryStore};
//!
//! let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
//! ```

use std::sync::Arc;

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{AlertStore, DeviceRegistry, IspRegistry, MetricStore};
pub use error::{StorageError, StorageResult};
pub use schema::{
    Alert, AlertId, AlertSeverity, AlertStatus, Device, DeviceId, DeviceType, Isp, Metric,
    NewAlert, NewDevice, NewIsp, NewMetric,
};

/// Handles to every store the poller needs
#[derive(Clone)]
pub struct Stores {
    pub devices: Arc<dyn DeviceRegistry>,
    pub metrics: Arc<dyn MetricStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub isps: Arc<dyn IspRegistry>,
}

impl Stores {
    /// Use one backend for all four stores
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: DeviceRegistry + MetricStore + AlertStore + IspRegistry + 'static,
    {
        Self {
            devices: backend.clone(),
            metrics: backend.clone(),
            alerts: backend.clone(),
            isps: backend,
        }
    }
}
