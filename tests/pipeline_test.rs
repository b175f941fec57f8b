use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use reddit_collector::{
    Batcher, Broadcaster, CollectorError, DedupCache, FailingModel, ItemKind, ItemSink,
    ItemSource, MemoryStore, MockModel, Normalizer, NullPublisher, PollCollector, RawItem,
    Result, SentimentAnalyzer, SentimentLabel, SessionSpec, StreamCollector, Supervisor,
    NEW_ITEMS_EVENT,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

fn raw_post(id: &str) -> RawItem {
    RawItem {
        id: id.to_string(),
        title: Some(format!("Title {}", id)),
        selftext: Some("great news all around".to_string()),
        body: None,
        author: Some("alice".to_string()),
        subreddit: "RustLang".to_string(),
        permalink: format!("/r/rustlang/comments/{}/", id),
        created_utc: 1_722_000_000.0,
        score: 10,
        num_comments: 3,
        stickied: false,
    }
}

fn raw_comment(id: &str) -> RawItem {
    RawItem {
        id: id.to_string(),
        title: None,
        selftext: None,
        body: Some("this is a helpful comment".to_string()),
        author: Some("bob".to_string()),
        subreddit: "rustlang".to_string(),
        permalink: format!("/r/rustlang/comments/thread/{}/", id),
        created_utc: 1_722_000_100.0,
        score: 2,
        num_comments: 0,
        stickied: false,
    }
}

fn test_normalizer() -> Normalizer {
    Normalizer::new(Arc::new(SentimentAnalyzer::new(Arc::new(MockModel::new(
        0.5,
    )))))
}

/// Scripted source: subscriptions are channel-fed, searches are queued
/// responses, hot listings are a fixed set.
struct MockSource {
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<RawItem>>>>,
    subscribe_calls: AtomicUsize,
    searches: Mutex<VecDeque<Result<Vec<RawItem>>>>,
    hot: Mutex<Vec<RawItem>>,
}

impl MockSource {
    fn new() -> Self {
        Self {
            subscriptions: Mutex::new(VecDeque::new()),
            subscribe_calls: AtomicUsize::new(0),
            searches: Mutex::new(VecDeque::new()),
            hot: Mutex::new(Vec::new()),
        }
    }

    fn push_subscription(&self) -> mpsc::UnboundedSender<Result<RawItem>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().unwrap().push_back(rx);
        tx
    }

    fn push_search(&self, result: Result<Vec<RawItem>>) {
        self.searches.lock().unwrap().push_back(result);
    }

    fn set_hot(&self, items: Vec<RawItem>) {
        *self.hot.lock().unwrap() = items;
    }

    fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemSource for MockSource {
    fn subscribe(&self, _subreddit: &str, _kind: ItemKind) -> BoxStream<'_, Result<RawItem>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(rx) => Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })),
            None => Box::pin(stream::empty()),
        }
    }

    async fn search(&self, _keywords: &[String], _subreddits: &[String]) -> Result<Vec<RawItem>> {
        let next = self.searches.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_hot(&self, _subreddit: &str, limit: usize) -> Result<Vec<RawItem>> {
        let hot = self.hot.lock().unwrap().clone();
        Ok(hot
            .into_iter()
            .filter(|item| !item.stickied)
            .take(limit)
            .collect())
    }
}

// Under paused time, a sleep only completes once every other task has run
// until it blocked, so the collector is guaranteed to have drained whatever
// was queued for it.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// --- normalizer ---

#[test]
fn normalizer_builds_post_items() {
    let normalizer = test_normalizer();
    let item = normalizer.normalize(&raw_post("p1"), ItemKind::Post).unwrap();

    assert_eq!(item.id, "p1");
    assert_eq!(item.item_kind, ItemKind::Post);
    assert_eq!(item.subreddit, "rustlang");
    assert_eq!(item.author, "alice");
    assert_eq!(item.content, "Title p1 great news all around");
    assert_eq!(item.url, "https://www.reddit.com/r/rustlang/comments/p1/");
    assert_eq!(item.sentiment_label, SentimentLabel::Positive);
    assert_eq!(item.sentiment_score, 0.5);
    assert_eq!(item.score, 10);
    assert_eq!(item.num_comments, 3);
}

#[test]
fn normalizer_uses_body_for_comments() {
    let normalizer = test_normalizer();
    let item = normalizer
        .normalize(&raw_comment("c1"), ItemKind::Comment)
        .unwrap();
    assert_eq!(item.item_kind, ItemKind::Comment);
    assert_eq!(item.content, "this is a helpful comment");
}

#[test]
fn normalizer_rejects_malformed_items() {
    let normalizer = test_normalizer();

    let mut no_title = raw_post("p2");
    no_title.title = None;
    assert!(matches!(
        normalizer.normalize(&no_title, ItemKind::Post),
        Err(CollectorError::Normalization(_))
    ));

    let mut no_body = raw_comment("c2");
    no_body.body = None;
    assert!(matches!(
        normalizer.normalize(&no_body, ItemKind::Comment),
        Err(CollectorError::Normalization(_))
    ));

    let mut no_id = raw_post("p3");
    no_id.id = String::new();
    assert!(matches!(
        normalizer.normalize(&no_id, ItemKind::Post),
        Err(CollectorError::Normalization(_))
    ));
}

#[test]
fn normalizer_defaults_deleted_authors() {
    let normalizer = test_normalizer();
    let mut raw = raw_post("p4");
    raw.author = None;
    let item = normalizer.normalize(&raw, ItemKind::Post).unwrap();
    assert_eq!(item.author, "[deleted]");
}

#[test]
fn model_failure_degrades_to_neutral() {
    let normalizer = Normalizer::new(Arc::new(SentimentAnalyzer::new(Arc::new(FailingModel))));
    let item = normalizer.normalize(&raw_post("p5"), ItemKind::Post).unwrap();
    assert_eq!(item.sentiment_label, SentimentLabel::Neutral);
    assert_eq!(item.sentiment_score, 0.0);
}

// --- batcher ---

#[tokio::test]
async fn batcher_flushes_once_full() {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let mut events = broadcaster.subscribe();

    let normalizer = test_normalizer();
    let mut batcher = Batcher::new(2, store.clone(), broadcaster.clone());

    for id in ["a", "b", "c"] {
        let item = normalizer.normalize(&raw_post(id), ItemKind::Post).unwrap();
        batcher.add(item).await;
    }

    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(store.batch_sizes().await, vec![2]);
    assert_eq!(batcher.pending_len(), 1);

    let event = events.try_recv().unwrap();
    assert_eq!(event.event, NEW_ITEMS_EVENT);
    assert_eq!(event.items.len(), 2);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn batcher_retains_batch_when_persistence_fails() {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(Broadcaster::new());
    let mut events = broadcaster.subscribe();

    let normalizer = test_normalizer();
    let mut batcher = Batcher::new(2, store.clone(), broadcaster.clone());

    store.set_failing(true);
    for id in ["a", "b"] {
        let item = normalizer.normalize(&raw_post(id), ItemKind::Post).unwrap();
        batcher.add(item).await;
    }

    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(batcher.pending_len(), 2, "failed batch must be retained");
    assert!(store.is_empty().await);
    assert!(events.try_recv().is_err(), "failed batch must not broadcast");

    // Recovery: the retained items ride along with the next trigger.
    store.set_failing(false);
    let item = normalizer.normalize(&raw_post("c"), ItemKind::Post).unwrap();
    batcher.add(item).await;

    assert_eq!(store.upsert_calls(), 2);
    assert_eq!(store.batch_sizes().await, vec![3]);
    assert_eq!(batcher.pending_len(), 0);
    assert_eq!(events.try_recv().unwrap().items.len(), 3);
}

#[tokio::test]
async fn batcher_caps_pending_growth_under_sustained_failure() {
    let store = Arc::new(MemoryStore::new());
    let normalizer = test_normalizer();
    let mut batcher = Batcher::new(2, store.clone(), Arc::new(NullPublisher));

    store.set_failing(true);
    for i in 0..100 {
        let item = normalizer
            .normalize(&raw_post(&format!("p{}", i)), ItemKind::Post)
            .unwrap();
        batcher.add(item).await;
    }

    // Cap is batch_size * 10; pending may sit one batch above it between
    // failed flushes but never grows without bound.
    assert!(
        batcher.pending_len() <= 2 * 10 + 2,
        "pending grew to {}",
        batcher.pending_len()
    );
}

// --- store ---

#[tokio::test]
async fn upsert_is_idempotent_per_id() {
    let store = MemoryStore::new();
    let normalizer = test_normalizer();

    let first = normalizer.normalize(&raw_post("x"), ItemKind::Post).unwrap();
    store.upsert_batch(std::slice::from_ref(&first)).await.unwrap();

    let mut second = first.clone();
    second.sentiment_score = -0.8;
    second.sentiment_label = SentimentLabel::Negative;
    store.upsert_batch(std::slice::from_ref(&second)).await.unwrap();

    assert_eq!(store.len().await, 1, "same id must stay one logical record");
    let stored = store.get("x").await.unwrap();
    assert_eq!(stored.sentiment_score, -0.8);
    assert_eq!(stored.sentiment_label, SentimentLabel::Negative);
}

// --- dedup cache ---

#[test]
fn dedup_prunes_to_most_recent() {
    let mut cache = DedupCache::new();
    for i in 0..=10_000 {
        cache.record(&format!("id-{}", i));
    }
    assert_eq!(cache.len(), 10_001);

    cache.maybe_prune();
    assert!(cache.len() >= 5_000 && cache.len() <= 5_001, "got {}", cache.len());
    assert!(cache.seen("id-10000"), "most recent ids must survive");
    assert!(cache.seen("id-6000"));
    assert!(!cache.seen("id-0"), "oldest ids must be pruned");
    assert!(!cache.seen("id-4999"));
}

#[test]
fn dedup_does_not_prune_below_threshold() {
    let mut cache = DedupCache::with_limits(10, 5);
    for i in 0..10 {
        cache.record(&format!("id-{}", i));
    }
    cache.maybe_prune();
    assert_eq!(cache.len(), 10, "at-threshold cache must not prune");

    cache.record("id-10");
    cache.maybe_prune();
    assert_eq!(cache.len(), 5);
    assert!(cache.seen("id-10"));
    assert!(!cache.seen("id-0"));
}

#[test]
fn dedup_record_is_idempotent() {
    let mut cache = DedupCache::new();
    cache.record("a");
    cache.record("a");
    assert_eq!(cache.len(), 1);
    assert!(cache.seen("a"));
    assert!(!cache.seen("b"));
}

// --- poll cycle ---

#[tokio::test]
async fn poll_cycle_skips_seen_ids_and_forces_flush() {
    let source = Arc::new(MockSource::new());
    let results: Vec<RawItem> = (0..100).map(|i| raw_post(&format!("p{}", i))).collect();
    source.push_search(Ok(results.clone()));
    source.push_search(Ok(results));

    let mut seeded = DedupCache::new();
    for i in 0..30 {
        seeded.record(&format!("p{}", i));
    }

    let store = Arc::new(MemoryStore::new());
    // Batch size well above the result count: only the forced end-of-cycle
    // flush can persist anything.
    let mut collector = PollCollector::new(
        source.clone(),
        test_normalizer(),
        Batcher::new(500, store.clone(), Arc::new(NullPublisher)),
        vec!["tesla".to_string()],
        vec!["all".to_string()],
        Duration::from_secs(300),
    )
    .with_dedup(seeded);

    let fresh = collector.run_once().await.unwrap();
    assert_eq!(fresh, 70, "exactly the unseen items are processed");
    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(store.batch_sizes().await, vec![70]);

    // Second cycle over the same window: everything is now seen.
    let fresh = collector.run_once().await.unwrap();
    assert_eq!(fresh, 0);
    assert_eq!(store.upsert_calls(), 1, "empty cycle flushes nothing");
}

#[tokio::test]
async fn poll_cycle_skips_malformed_items() {
    let source = Arc::new(MockSource::new());
    let mut broken = raw_post("broken");
    broken.title = None;
    source.push_search(Ok(vec![raw_post("ok1"), broken, raw_post("ok2")]));

    let store = Arc::new(MemoryStore::new());
    let mut collector = PollCollector::new(
        source,
        test_normalizer(),
        Batcher::new(10, store.clone(), Arc::new(NullPublisher)),
        vec!["tesla".to_string()],
        vec!["all".to_string()],
        Duration::from_secs(300),
    );

    let fresh = collector.run_once().await.unwrap();
    assert_eq!(fresh, 2);
    assert_eq!(store.batch_sizes().await, vec![2]);
    assert!(store.get("ok1").await.is_some());
    assert!(store.get("broken").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn poll_loop_backs_off_after_transient_error() {
    let source = Arc::new(MockSource::new());
    source.push_search(Err(CollectorError::RateLimited));
    source.push_search(Ok(vec![raw_post("after-backoff")]));

    let store = Arc::new(MemoryStore::new());
    let collector = PollCollector::new(
        source.clone(),
        test_normalizer(),
        Batcher::new(1, store.clone(), Arc::new(NullPublisher)),
        vec!["tesla".to_string()],
        vec!["all".to_string()],
        Duration::from_secs(300),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(collector.run(shutdown_rx));

    // Virtual time: the transient backoff is 60s, so the second cycle has
    // run by the 61s mark.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(store.upsert_calls(), 1);
    assert!(store.get("after-backoff").await.is_some());

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

// --- stream mode ---

#[tokio::test(start_paused = true)]
async fn stream_flushes_full_batches_and_drains_on_shutdown() {
    let source = Arc::new(MockSource::new());
    let feed = source.push_subscription();

    let store = Arc::new(MemoryStore::new());
    let collector = StreamCollector::new(
        source.clone(),
        test_normalizer(),
        Batcher::new(2, store.clone(), Arc::new(NullPublisher)),
        "rustlang".to_string(),
        ItemKind::Comment,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(collector.run(shutdown_rx));

    for id in ["c1", "c2", "c3"] {
        feed.send(Ok(raw_comment(id))).unwrap();
    }
    settle().await;

    // The first flush fired as the second item landed; the third stays
    // pending until the next trigger.
    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(store.batch_sizes().await, vec![2]);
    assert_eq!(store.len().await, 2);

    // Shutdown is the next trigger: the pending item is drained.
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(store.batch_sizes().await, vec![2, 1]);
    assert_eq!(store.len().await, 3);
}

#[tokio::test(start_paused = true)]
async fn stream_resubscribes_after_transient_error() {
    let source = Arc::new(MockSource::new());
    let first = source.push_subscription();
    let second = source.push_subscription();

    let store = Arc::new(MemoryStore::new());
    let collector = StreamCollector::new(
        source.clone(),
        test_normalizer(),
        Batcher::new(1, store.clone(), Arc::new(NullPublisher)),
        "rustlang".to_string(),
        ItemKind::Comment,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(collector.run(shutdown_rx));

    first.send(Err(CollectorError::RateLimited)).unwrap();
    second.send(Ok(raw_comment("recovered"))).unwrap();

    // Virtual time: the transient backoff is 60s, so the second subscription
    // is live by the 61s mark.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(source.subscribe_calls(), 2, "loop must resubscribe after backoff");
    assert_eq!(store.upsert_calls(), 1);
    assert!(store.get("recovered").await.is_some());

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

// --- on-demand fetch ---

#[tokio::test]
async fn fetch_hot_once_processes_and_flushes() {
    let source = MockSource::new();
    let mut pinned = raw_post("pinned");
    pinned.stickied = true;
    source.set_hot(vec![raw_post("h1"), pinned, raw_post("h2")]);

    let store = Arc::new(MemoryStore::new());
    let normalizer = test_normalizer();
    let mut batcher = Batcher::new(50, store.clone(), Arc::new(NullPublisher));

    let count =
        reddit_collector::fetch_hot_once(&source, &normalizer, &mut batcher, "rustlang", 50)
            .await
            .unwrap();

    assert_eq!(count, 2, "stickied posts are excluded");
    assert_eq!(store.batch_sizes().await, vec![2]);
    assert!(store.get("pinned").await.is_none());
}

// --- configuration ---

#[test]
fn session_specs_validate_at_startup() {
    let valid = SessionSpec::Stream {
        subreddit: "python".to_string(),
        kind: ItemKind::Comment,
        batch_size: 50,
    };
    assert!(valid.validate().is_ok());

    let empty_subreddit = SessionSpec::Stream {
        subreddit: "  ".to_string(),
        kind: ItemKind::Post,
        batch_size: 50,
    };
    assert!(matches!(
        empty_subreddit.validate(),
        Err(CollectorError::Config(_))
    ));

    let no_keywords = SessionSpec::Poll {
        keywords: vec![],
        subreddits: vec!["all".to_string()],
        batch_size: 50,
        poll_interval: Duration::from_secs(300),
    };
    assert!(matches!(no_keywords.validate(), Err(CollectorError::Config(_))));

    let zero_batch = SessionSpec::Poll {
        keywords: vec!["tesla".to_string()],
        subreddits: vec!["all".to_string()],
        batch_size: 0,
        poll_interval: Duration::from_secs(300),
    };
    assert!(matches!(zero_batch.validate(), Err(CollectorError::Config(_))));
}

// --- supervisor ---

#[tokio::test(start_paused = true)]
async fn supervisor_rejects_invalid_sessions_and_honors_shutdown() {
    let source = Arc::new(MockSource::new());
    let store = Arc::new(MemoryStore::new());
    let analyzer = Arc::new(SentimentAnalyzer::new(Arc::new(MockModel::new(0.5))));
    let supervisor = Supervisor::new(
        source,
        store,
        Arc::new(NullPublisher),
        analyzer,
    );

    let (_tx, rx) = watch::channel(false);
    let invalid = SessionSpec::Poll {
        keywords: vec![],
        subreddits: vec!["all".to_string()],
        batch_size: 50,
        poll_interval: Duration::from_secs(300),
    };
    assert!(matches!(
        supervisor.run(vec![invalid], rx.clone()).await,
        Err(CollectorError::Config(_))
    ));

    let valid = SessionSpec::Poll {
        keywords: vec!["tesla".to_string()],
        subreddits: vec!["all".to_string()],
        batch_size: 50,
        poll_interval: Duration::from_secs(300),
    };
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { supervisor.run(vec![valid], rx).await });

    tokio::task::yield_now().await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(600), handle)
        .await
        .expect("supervisor must stop promptly on shutdown")
        .unwrap()
        .unwrap();
}
