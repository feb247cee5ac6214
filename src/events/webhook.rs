use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use super::Event;
use super::publisher::{EventPublisher, PublishError};

/// POSTs every event to a fixed URL as
/// `{ "topic": ..., "timestamp": ..., "data": <event> }`
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    #[instrument(skip(self, event), fields(url = %self.url, kind = event.kind()))]
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), PublishError> {
        let payload = json!({
            "topic": topic,
            "timestamp": Utc::now().to_rfc3339(),
            "data": serde_json::to_value(event)?,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PublishError::Transport(format!(
                "webhook answered with status {}",
                response.status()
            )));
        }

        debug!("webhook accepted event");
        Ok(())
    }
}
