use crate::analyzer::{Sentiment, SentimentAnalyzer};
use crate::types::{CollectedItem, CollectorError, ItemKind, RawItem, Result};
use chrono::DateTime;
use std::sync::Arc;
use tracing::warn;
use url::Url;

const REDDIT_BASE_URL: &str = "https://www.reddit.com";

/// Sentinel stored when the upstream author account no longer exists.
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Turns raw listing payloads into `CollectedItem`s, invoking the sentiment
/// analyzer exactly once per item. A malformed payload is a
/// `Normalization` error the caller skips; an analyzer failure degrades to
/// neutral and never blocks the item.
pub struct Normalizer {
    analyzer: Arc<SentimentAnalyzer>,
}

impl Normalizer {
    pub fn new(analyzer: Arc<SentimentAnalyzer>) -> Self {
        Self { analyzer }
    }

    pub fn normalize(&self, raw: &RawItem, kind: ItemKind) -> Result<CollectedItem> {
        if raw.id.is_empty() {
            return Err(CollectorError::Normalization("missing item id".to_string()));
        }

        let content = match kind {
            ItemKind::Post => {
                let title = raw.title.as_deref().ok_or_else(|| {
                    CollectorError::Normalization(format!("post {} has no title", raw.id))
                })?;
                match raw.selftext.as_deref() {
                    Some(body) if !body.is_empty() => format!("{} {}", title, body),
                    _ => title.to_string(),
                }
            }
            ItemKind::Comment => raw
                .body
                .as_deref()
                .ok_or_else(|| {
                    CollectorError::Normalization(format!("comment {} has no body", raw.id))
                })?
                .to_string(),
        };

        if raw.permalink.is_empty() {
            return Err(CollectorError::Normalization(format!(
                "item {} has no permalink",
                raw.id
            )));
        }
        let url = Url::parse(&format!("{}{}", REDDIT_BASE_URL, raw.permalink))?.to_string();

        let secs = raw.created_utc as i64;
        let created_utc = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
            CollectorError::Normalization(format!(
                "item {} has out-of-range timestamp {}",
                raw.id, raw.created_utc
            ))
        })?;

        let sentiment = match self.analyzer.analyze(&content) {
            Ok(sentiment) => sentiment,
            Err(e) => {
                warn!(item = %raw.id, error = %e, "sentiment model failed, defaulting to neutral");
                Sentiment::neutral()
            }
        };

        Ok(CollectedItem {
            id: raw.id.clone(),
            item_kind: kind,
            subreddit: raw.subreddit.to_lowercase(),
            author: raw
                .author
                .clone()
                .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            content,
            url,
            created_utc,
            sentiment_label: sentiment.label,
            sentiment_score: sentiment.score,
            score: raw.score,
            num_comments: raw.num_comments,
        })
    }
}
