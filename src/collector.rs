use crate::batcher::Batcher;
use crate::dedup::DedupCache;
use crate::normalizer::Normalizer;
use crate::traits::ItemSource;
use crate::types::{CollectorError, ItemKind, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Fixed pause before retrying after a transient upstream error.
pub const TRANSIENT_BACKOFF: Duration = Duration::from_secs(60);
/// Fixed pause before retrying after an unexpected error in stream mode.
pub const UNEXPECTED_BACKOFF: Duration = Duration::from_secs(30);

/// The two states an acquisition loop moves through. There is no terminal
/// state reachable from normal operation; only shutdown ends a loop.
enum Phase {
    Running,
    Backoff(Duration),
}

/// Cancellable pause: returns false as soon as shutdown fires, without
/// waiting out the remainder of the delay.
pub(crate) async fn sleep_unless_shutdown(
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

/// Stream-mode acquisition loop: one live subscription, every new item
/// normalized and batched as it arrives. Transient upstream errors pause
/// 60s before resubscribing, anything else 30s.
pub struct StreamCollector {
    source: Arc<dyn ItemSource>,
    normalizer: Normalizer,
    batcher: Batcher,
    subreddit: String,
    kind: ItemKind,
}

impl StreamCollector {
    pub fn new(
        source: Arc<dyn ItemSource>,
        normalizer: Normalizer,
        batcher: Batcher,
        subreddit: String,
        kind: ItemKind,
    ) -> Self {
        Self {
            source,
            normalizer,
            batcher,
            subreddit,
            kind,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(subreddit = %self.subreddit, kind = %self.kind, "starting stream collector");
        let mut phase = Phase::Running;

        loop {
            if *shutdown.borrow() {
                break;
            }
            match phase {
                Phase::Backoff(delay) => {
                    if !sleep_unless_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    phase = Phase::Running;
                }
                Phase::Running => match self.pull(&mut shutdown).await {
                    Ok(()) => break,
                    Err(e) if e.is_transient() => {
                        warn!(
                            error = %e,
                            delay_secs = TRANSIENT_BACKOFF.as_secs(),
                            "transient upstream error, pausing before resubscribing"
                        );
                        phase = Phase::Backoff(TRANSIENT_BACKOFF);
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            delay_secs = UNEXPECTED_BACKOFF.as_secs(),
                            "unexpected stream error, pausing before resubscribing"
                        );
                        phase = Phase::Backoff(UNEXPECTED_BACKOFF);
                    }
                },
            }
        }

        // Drain whatever is still pending so shutdown loses nothing.
        self.batcher.flush_now().await;
        info!(subreddit = %self.subreddit, "stream collector stopped");
        Ok(())
    }

    async fn pull(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let mut items = self.source.subscribe(&self.subreddit, self.kind);
        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                next = items.next() => match next {
                    Some(Ok(raw)) => match self.normalizer.normalize(&raw, self.kind) {
                        Ok(item) => self.batcher.add(item).await,
                        Err(e) => warn!(error = %e, "skipping malformed item"),
                    },
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(CollectorError::General(
                            "subscription stream ended".to_string(),
                        ))
                    }
                },
            }
        }
    }
}

/// Poll-mode acquisition loop: one bounded keyword search per cycle, with
/// dedup suppression, a forced end-of-cycle flush, and a prune. Transient
/// search errors pause 60s; anything else waits out one poll interval,
/// matching the cycle cadence.
pub struct PollCollector {
    source: Arc<dyn ItemSource>,
    normalizer: Normalizer,
    batcher: Batcher,
    dedup: DedupCache,
    keywords: Vec<String>,
    subreddits: Vec<String>,
    poll_interval: Duration,
}

impl PollCollector {
    pub fn new(
        source: Arc<dyn ItemSource>,
        normalizer: Normalizer,
        batcher: Batcher,
        keywords: Vec<String>,
        subreddits: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            normalizer,
            batcher,
            dedup: DedupCache::new(),
            keywords,
            subreddits,
            poll_interval,
        }
    }

    /// Replaces the default dedup cache; used by tests to exercise prune
    /// behavior at small sizes.
    pub fn with_dedup(mut self, dedup: DedupCache) -> Self {
        self.dedup = dedup;
        self
    }

    /// One bounded search cycle: query, skip already-seen ids, normalize
    /// and batch the rest, force a flush, prune the cache. Returns how many
    /// items were newly processed.
    pub async fn run_once(&mut self) -> Result<usize> {
        let results = self
            .source
            .search(&self.keywords, &self.subreddits)
            .await?;
        let total = results.len();
        let mut fresh = 0;

        for raw in &results {
            if self.dedup.seen(&raw.id) {
                continue;
            }
            match self.normalizer.normalize(raw, ItemKind::Post) {
                Ok(item) => {
                    self.batcher.add(item).await;
                    self.dedup.record(&raw.id);
                    fresh += 1;
                }
                Err(e) => warn!(error = %e, "skipping malformed item"),
            }
        }

        self.batcher.flush_now().await;
        self.dedup.maybe_prune();
        info!(total, fresh, seen = self.dedup.len(), "poll cycle complete");
        Ok(fresh)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            keywords = %self.keywords.join(" OR "),
            subreddits = %self.subreddits.join("+"),
            "starting poll collector"
        );
        let mut phase = Phase::Running;

        loop {
            if *shutdown.borrow() {
                break;
            }
            match phase {
                Phase::Backoff(delay) => {
                    if !sleep_unless_shutdown(delay, &mut shutdown).await {
                        break;
                    }
                    phase = Phase::Running;
                }
                Phase::Running => match self.run_once().await {
                    Ok(_) => {
                        if !sleep_unless_shutdown(self.poll_interval, &mut shutdown).await {
                            break;
                        }
                    }
                    Err(e) if e.is_transient() => {
                        warn!(
                            error = %e,
                            delay_secs = TRANSIENT_BACKOFF.as_secs(),
                            "transient upstream error, pausing before next cycle"
                        );
                        phase = Phase::Backoff(TRANSIENT_BACKOFF);
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            delay_secs = self.poll_interval.as_secs(),
                            "unexpected poll error, retrying after poll interval"
                        );
                        phase = Phase::Backoff(self.poll_interval);
                    }
                },
            }
        }

        self.batcher.flush_now().await;
        info!("poll collector stopped");
        Ok(())
    }
}

/// One bounded pass over a subreddit's hot listing, for user-initiated
/// fetches outside the long-running sessions. Stickied posts are already
/// filtered by the source.
pub async fn fetch_hot_once(
    source: &dyn ItemSource,
    normalizer: &Normalizer,
    batcher: &mut Batcher,
    subreddit: &str,
    limit: usize,
) -> Result<usize> {
    let results = source.fetch_hot(subreddit, limit).await?;
    let mut count = 0;

    for raw in &results {
        match normalizer.normalize(raw, ItemKind::Post) {
            Ok(item) => {
                batcher.add(item).await;
                count += 1;
            }
            Err(e) => warn!(error = %e, "skipping malformed item"),
        }
    }

    batcher.flush_now().await;
    info!(subreddit, count, "on-demand fetch complete");
    Ok(count)
}
