pub mod analyzer;
pub mod batcher;
pub mod broadcast;
pub mod collector;
pub mod config;
pub mod dedup;
pub mod normalizer;
pub mod sources;
pub mod store;
pub mod supervisor;
pub mod traits;
pub mod types;

pub use analyzer::{
    classify_score, FailingModel, LexiconModel, MockModel, Sentiment, SentimentAnalyzer,
    SentimentModel,
};
pub use batcher::Batcher;
pub use broadcast::{BatchEvent, Broadcaster, NullPublisher, NEW_ITEMS_EVENT};
pub use collector::{fetch_hot_once, PollCollector, StreamCollector};
pub use config::{
    AppConfig, RedditCredentials, SessionSpec, DEFAULT_BATCH_SIZE, DEFAULT_FETCH_LIMIT,
    DEFAULT_POLL_INTERVAL_SECS,
};
pub use dedup::DedupCache;
pub use normalizer::Normalizer;
pub use sources::RedditClient;
pub use store::{ItemStore, MemoryStore};
pub use supervisor::Supervisor;
pub use traits::{ItemSink, ItemSource, Publisher};
pub use types::{CollectedItem, CollectorError, ItemKind, RawItem, Result, SentimentLabel};
