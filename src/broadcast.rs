use crate::traits::Publisher;
use crate::types::{CollectedItem, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Event name carried by every newly processed batch.
pub const NEW_ITEMS_EVENT: &str = "new_items";

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// One fan-out payload: a processed batch with its own identity, so
/// subscribers can spot the at-most-once delivery they did or did not get.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEvent {
    pub id: Uuid,
    pub event: String,
    pub items: Vec<CollectedItem>,
    pub emitted_at: DateTime<Utc>,
}

/// Best-effort fan-out over a tokio broadcast channel. Subscribers that are
/// absent or lagging are never an error; nothing is retried.
pub struct Broadcaster {
    tx: broadcast::Sender<BatchEvent>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for Broadcaster {
    async fn publish(&self, event: &str, items: &[CollectedItem]) -> Result<()> {
        let payload = BatchEvent {
            id: Uuid::new_v4(),
            event: event.to_string(),
            items: items.to_vec(),
            emitted_at: Utc::now(),
        };
        // A send error just means nobody is listening right now.
        match self.tx.send(payload) {
            Ok(receivers) => debug!(event, receivers, count = items.len(), "broadcast batch"),
            Err(_) => debug!(event, count = items.len(), "no live subscribers, batch dropped"),
        }
        Ok(())
    }
}

/// No-op publisher for tests and runs without live subscribers.
pub struct NullPublisher;

#[async_trait]
impl Publisher for NullPublisher {
    async fn publish(&self, _event: &str, _items: &[CollectedItem]) -> Result<()> {
        Ok(())
    }
}
