use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Prune once the cache grows past this many ids.
pub const DEDUP_PRUNE_THRESHOLD: usize = 10_000;
/// How many of the most recently recorded ids survive a prune.
pub const DEDUP_RETAIN: usize = 5_000;

/// Seen-id cache for poll mode, where every cycle re-queries the same time
/// window. Purely a throughput optimization: storage correctness rests on
/// the sink's upsert, so losing this cache on restart only costs some
/// re-processing noise. Insertion order stands in for recency.
pub struct DedupCache {
    ids: HashSet<String>,
    order: VecDeque<String>,
    threshold: usize,
    retain: usize,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_limits(DEDUP_PRUNE_THRESHOLD, DEDUP_RETAIN)
    }

    pub fn with_limits(threshold: usize, retain: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            threshold,
            retain,
        }
    }

    pub fn seen(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn record(&mut self, id: &str) {
        if self.ids.insert(id.to_string()) {
            self.order.push_back(id.to_string());
        }
    }

    /// Prunes down to the `retain` most recently recorded ids, but only once
    /// the cache has grown past `threshold`. Called at poll-cycle end.
    pub fn maybe_prune(&mut self) {
        if self.ids.len() <= self.threshold {
            return;
        }
        let before = self.ids.len();
        while self.order.len() > self.retain {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        debug!(before, after = self.ids.len(), "pruned dedup cache");
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}
