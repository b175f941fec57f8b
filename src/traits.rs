use crate::types::{CollectedItem, ItemKind, RawItem, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Upstream feed source. `subscribe` yields new items as they appear
/// (skip-existing: nothing that predates the subscription is replayed);
/// `search` is one bounded newest-first query over the last hour.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Infinite live stream of new items for one subreddit. An `Err` item
    /// ends the subscription; the caller decides whether to resubscribe.
    fn subscribe(&self, subreddit: &str, kind: ItemKind) -> BoxStream<'_, Result<RawItem>>;

    /// One bounded keyword search (disjunction) across a subreddit set,
    /// newest first, restricted to the last hour.
    async fn search(&self, keywords: &[String], subreddits: &[String]) -> Result<Vec<RawItem>>;

    /// Bounded snapshot of a subreddit's hot listing, stickied posts
    /// excluded. Used by the on-demand fetch path.
    async fn fetch_hot(&self, subreddit: &str, limit: usize) -> Result<Vec<RawItem>>;
}

/// Persistence sink. `upsert_batch` must be idempotent per item id:
/// repeating an id overwrites mutable fields and never inserts a duplicate.
/// The whole batch is one atomic unit of work from the caller's view.
#[async_trait]
pub trait ItemSink: Send + Sync {
    async fn upsert_batch(&self, items: &[CollectedItem]) -> Result<()>;
}

/// Fan-out to live subscribers, at-most-once and best-effort. Failures are
/// reported but never retried and never block the pipeline.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &str, items: &[CollectedItem]) -> Result<()>;
}
