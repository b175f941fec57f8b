use crate::broadcast::NEW_ITEMS_EVENT;
use crate::traits::{ItemSink, Publisher};
use crate::types::CollectedItem;
use std::sync::Arc;
use tracing::{info, warn};

/// Hard cap on pending items under sustained persistence failure, as a
/// multiple of the configured batch size. Oldest items are dropped once the
/// cap is hit.
pub const MAX_PENDING_FACTOR: usize = 10;

/// Accumulates normalized items and hands them to the persistence and
/// broadcast sinks as one unit. A flush that fails at the persistence sink
/// leaves the batch intact and unbroadcast; the items ride along until the
/// next natural flush trigger.
pub struct Batcher {
    pending: Vec<CollectedItem>,
    batch_size: usize,
    max_pending: usize,
    store: Arc<dyn ItemSink>,
    publisher: Arc<dyn Publisher>,
}

impl Batcher {
    pub fn new(batch_size: usize, store: Arc<dyn ItemSink>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            pending: Vec::new(),
            batch_size,
            max_pending: batch_size * MAX_PENDING_FACTOR,
            store,
            publisher,
        }
    }

    /// Appends one item, flushing automatically once the batch is full.
    pub async fn add(&mut self, item: CollectedItem) {
        self.pending.push(item);
        if self.pending.len() >= self.batch_size {
            self.try_flush().await;
        }
    }

    /// Forces a flush regardless of fill level. Used at poll-cycle end and
    /// on shutdown so no item waits longer than one cycle.
    pub async fn flush_now(&mut self) {
        self.try_flush().await;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn try_flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        match self.store.upsert_batch(&self.pending).await {
            Ok(()) => {
                info!(count = self.pending.len(), "persisted batch");
                if let Err(e) = self.publisher.publish(NEW_ITEMS_EVENT, &self.pending).await {
                    warn!(error = %e, "broadcast failed, not retrying");
                }
                self.pending.clear();
            }
            Err(e) => {
                warn!(
                    error = %e,
                    pending = self.pending.len(),
                    "batch persist failed, retrying on next flush trigger"
                );
                if self.pending.len() > self.max_pending {
                    let overflow = self.pending.len() - self.max_pending;
                    self.pending.drain(..overflow);
                    warn!(dropped = overflow, "pending batch over cap, dropped oldest items");
                }
            }
        }
    }
}

impl std::fmt::Debug for Batcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("pending", &self.pending.len())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}
