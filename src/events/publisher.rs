//! Event publishers
//!
//! Publishing is fire-and-forget from the poller's point of view: callers go through
//! [`publish_best_effort`], which logs failures and never returns them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, error, trace};

use super::Event;

/// Default capacity of each in-process topic channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Nobody is listening on the topic; the event was dropped
    #[error("no subscribers on topic {0}")]
    NoSubscribers(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), PublishError>;
}

/// Publish and swallow the outcome
pub async fn publish_best_effort(publisher: &dyn EventPublisher, topic: &str, event: &Event) {
    match publisher.publish(topic, event).await {
        Ok(()) => trace!("published {} on {topic}", event.kind()),
        Err(PublishError::NoSubscribers(_)) => {
            trace!("dropped {} on {topic}: no subscribers", event.kind())
        }
        Err(e) => error!("failed to publish {} on {topic}: {e}", event.kind()),
    }
}

/// In-process fan-out over one `tokio::sync::broadcast` channel per topic
///
/// Slow subscribers lag and lose the oldest events rather than blocking the poller.
#[derive(Debug)]
pub struct BroadcastPublisher {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<Event>>>,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<Event> {
        if let Some(sender) = self.topics.read().await.get(topic) {
            return sender.subscribe();
        }

        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), PublishError> {
        let topics = self.topics.read().await;
        let Some(sender) = topics.get(topic) else {
            return Err(PublishError::NoSubscribers(topic.to_string()));
        };

        sender
            .send(event.clone())
            .map(|receivers| debug!("{} delivered to {receivers} subscriber(s)", event.kind()))
            .map_err(|_| PublishError::NoSubscribers(topic.to_string()))
    }
}

/// Forwards every event to several publishers
///
/// All publishers are attempted. The first real failure is reported; the fan-out only reports
/// `NoSubscribers` when every publisher did.
#[derive(Default, Clone)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }

    pub fn push(&mut self, publisher: Arc<dyn EventPublisher>) {
        self.publishers.push(publisher);
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), PublishError> {
        let mut failure = None;
        let mut unheard = 0;

        for publisher in &self.publishers {
            match publisher.publish(topic, event).await {
                Ok(()) => {}
                Err(PublishError::NoSubscribers(_)) => unheard += 1,
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None if unheard > 0 && unheard == self.publishers.len() => {
                Err(PublishError::NoSubscribers(topic.to_string()))
            }
            None => Ok(()),
        }
    }
}

/// Keeps every published event in memory
///
/// Used by tests and dry runs to observe exactly what the poller emitted.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<(String, Event)>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail with a transport error (events are still not recorded)
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .await
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub async fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Events whose `type` is `kind`
    pub async fn events_of(&self, kind: &str) -> Vec<Event> {
        self.events()
            .await
            .into_iter()
            .filter(|event| event.kind() == kind)
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, event: &Event) -> Result<(), PublishError> {
        if *self.failing.lock().await {
            return Err(PublishError::Transport("recording publisher is failing".to_string()));
        }
        self.events
            .lock()
            .await
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}
