//! API shared state

use std::sync::Arc;

use crate::api::types::{InitialData, LatestMetric};
use crate::events::BroadcastPublisher;
use crate::storage::{AlertSeverity, AlertStore, DeviceRegistry, MetricStore, StorageResult, Stores};

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub stores: Stores,

    /// In-process event bus the poller publishes to
    pub events: Arc<BroadcastPublisher>,
}

impl ApiState {
    pub fn new(stores: Stores, events: Arc<BroadcastPublisher>) -> Self {
        Self { stores, events }
    }

    /// Devices online, open critical alerts and the latest metric
    pub async fn snapshot(&self) -> StorageResult<InitialData> {
        let devices_online = self.stores.devices.count_online().await?;
        let alerts_critical = self
            .stores
            .alerts
            .count_open(Some(AlertSeverity::Critical))
            .await?;
        let latest_metrics = self
            .stores
            .metrics
            .latest(None, 1)
            .await?
            .into_iter()
            .next()
            .map(LatestMetric::from);

        Ok(InitialData {
            devices_online,
            alerts_critical,
            latest_metrics,
        })
    }
}
