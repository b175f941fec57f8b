use crate::traits::ItemSink;
use crate::types::{CollectedItem, CollectorError, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Postgres-backed item store. The upsert keyed on `id` is the system's
/// correctness guarantee against duplicates: repeating an id overwrites the
/// mutable fields and leaves identity fields untouched.
pub struct ItemStore {
    pool: PgPool,
}

impl ItemStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn setup_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reddit_items (
                id TEXT PRIMARY KEY,
                item_kind TEXT NOT NULL,
                subreddit TEXT NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                url TEXT NOT NULL,
                created_utc TIMESTAMPTZ NOT NULL,
                sentiment_label TEXT NOT NULL,
                sentiment_score DOUBLE PRECISION NOT NULL,
                score BIGINT NOT NULL DEFAULT 0,
                num_comments BIGINT NOT NULL DEFAULT 0,
                processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reddit_items_subreddit_created
             ON reddit_items (subreddit, created_utc DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("item store schema ready");
        Ok(())
    }
}

#[async_trait]
impl ItemSink for ItemStore {
    async fn upsert_batch(&self, items: &[CollectedItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO reddit_items
                    (id, item_kind, subreddit, author, content, url, created_utc,
                     sentiment_label, sentiment_score, score, num_comments)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (id) DO UPDATE SET
                    content = EXCLUDED.content,
                    sentiment_label = EXCLUDED.sentiment_label,
                    sentiment_score = EXCLUDED.sentiment_score,
                    score = EXCLUDED.score,
                    num_comments = EXCLUDED.num_comments,
                    processed_at = NOW()
                "#,
            )
            .bind(&item.id)
            .bind(item.item_kind.as_str())
            .bind(&item.subreddit)
            .bind(&item.author)
            .bind(&item.content)
            .bind(&item.url)
            .bind(item.created_utc)
            .bind(item.sentiment_label.as_str())
            .bind(item.sentiment_score)
            .bind(item.score)
            .bind(item.num_comments)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = items.len(), "upserted batch");
        Ok(())
    }
}

/// In-memory sink with the same upsert semantics, plus a failure toggle and
/// call accounting. Backs the pipeline tests; no database required.
pub struct MemoryStore {
    items: Mutex<HashMap<String, CollectedItem>>,
    batch_sizes: Mutex<Vec<usize>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            batch_sizes: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent `upsert_batch` fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total `upsert_batch` calls, including failed ones.
    pub fn upsert_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batch sizes of successful upserts, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<CollectedItem> {
        self.items.lock().await.get(id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ItemSink for MemoryStore {
    async fn upsert_batch(&self, items: &[CollectedItem]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollectorError::General("memory store failing".to_string()));
        }

        let mut map = self.items.lock().await;
        for item in items {
            map.insert(item.id.clone(), item.clone());
        }
        self.batch_sizes.lock().await.push(items.len());
        Ok(())
    }
}
