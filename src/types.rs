use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Post,
    Comment,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Post => "post",
            ItemKind::Comment => "comment",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processed post or comment, the unit the pipeline batches, stores
/// and broadcasts. `sentiment_label` is always derived from
/// `sentiment_score` by the normalizer; the two are never set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedItem {
    pub id: String,
    pub item_kind: ItemKind,
    pub subreddit: String,
    pub author: String,
    pub content: String,
    pub url: String,
    pub created_utc: DateTime<Utc>,
    pub sentiment_label: SentimentLabel,
    pub sentiment_score: f64,
    pub score: i64,
    pub num_comments: i64,
}

/// The `data` node of one Reddit listing child, as returned by the JSON API.
/// Posts carry `title`/`selftext`, comments carry `body`; a deleted author
/// comes through as null.
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub selftext: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub stickied: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reddit API returned {status} for {endpoint}")]
    Api { status: u16, endpoint: String },

    #[error("rate limited by Reddit API")]
    RateLimited,

    #[error("malformed upstream payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("item failed normalization: {0}")]
    Normalization(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("sentiment model error: {0}")]
    Model(String),

    #[error("{0}")]
    General(String),
}

impl CollectorError {
    /// Errors recovered by the fixed 60s upstream backoff: rate limiting,
    /// upstream 5xx and transport-level failures. Everything else takes the
    /// shorter unexpected-error path.
    pub fn is_transient(&self) -> bool {
        match self {
            CollectorError::RateLimited => true,
            CollectorError::Http(_) => true,
            CollectorError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
