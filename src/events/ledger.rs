//! Alert creation with exactly-once notification
//!
//! Every alert the poller raises goes through [`AlertLedger::get_or_create`]. It returns the
//! existing open alert for `(device_id, condition)` when there is one, otherwise creates it and
//! publishes a single `alert_triggered` event. No other code path publishes that event.
//!
//! Informational alerts that mark a one-off occurrence go through [`AlertLedger::record_resolved`]
//! instead: they are stored already resolved, so they never hold the open-alert key.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::publisher::{EventPublisher, publish_best_effort};
use super::{DASHBOARD_TOPIC, Event};
use crate::storage::backend::AlertStore;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{Alert, AlertStatus, DeviceId, NewAlert};

#[derive(Clone)]
pub struct AlertLedger {
    store: Arc<dyn AlertStore>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
}

impl AlertLedger {
    pub fn new(store: Arc<dyn AlertStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store,
            publisher,
            topic: DASHBOARD_TOPIC.to_string(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AlertStore> {
        &self.store
    }

    /// Returns the open alert for the key and whether this call created it
    #[instrument(skip(self, alert), fields(device_id = alert.device_id, condition = %alert.condition))]
    pub async fn get_or_create(
        &self,
        alert: NewAlert,
        device_name: &str,
    ) -> StorageResult<(Alert, bool)> {
        if let Some(existing) = self.store.find_open(alert.device_id, &alert.condition).await? {
            debug!("open alert {} already exists", existing.id);
            return Ok((existing, false));
        }

        let (device_id, condition) = (alert.device_id, alert.condition.clone());
        match self.store.create(alert).await {
            Ok(created) => {
                info!("raised {} alert: {}", created.severity, created.title);
                let event = Event::alert_triggered(&created, device_name);
                publish_best_effort(self.publisher.as_ref(), &self.topic, &event).await;
                Ok((created, true))
            }
            // lost a race against another creator
            Err(StorageError::Conflict(reason)) => self
                .store
                .find_open(device_id, &condition)
                .await?
                .map(|existing| (existing, false))
                .ok_or(StorageError::Conflict(reason)),
            Err(e) => Err(e),
        }
    }

    /// Store an alert that is terminal on creation and publish it once.
    ///
    /// Every call records a new alert, since nothing stays open to deduplicate against.
    #[instrument(skip(self, alert), fields(device_id = alert.device_id, condition = %alert.condition))]
    pub async fn record_resolved(&self, alert: NewAlert, device_name: &str) -> StorageResult<Alert> {
        // a row left open by an earlier failed resolve would block the insert
        self.resolve(alert.device_id, &alert.condition).await?;

        let created = self.store.create(alert).await?;
        let resolved = self.store.set_status(created.id, AlertStatus::Resolved).await?;
        info!("recorded {} alert: {}", resolved.severity, resolved.title);

        let event = Event::alert_triggered(&resolved, device_name);
        publish_best_effort(self.publisher.as_ref(), &self.topic, &event).await;
        Ok(resolved)
    }

    /// Resolve the open alert for the key, if any
    pub async fn resolve(&self, device_id: DeviceId, condition: &str) -> StorageResult<Option<Alert>> {
        let Some(open) = self.store.find_open(device_id, condition).await? else {
            return Ok(None);
        };

        let resolved = self.store.set_status(open.id, AlertStatus::Resolved).await?;
        info!("resolved alert {}: {}", resolved.id, resolved.title);
        Ok(Some(resolved))
    }
}
