use crate::analyzer::SentimentAnalyzer;
use crate::batcher::Batcher;
use crate::collector::{sleep_unless_shutdown, PollCollector, StreamCollector};
use crate::config::SessionSpec;
use crate::normalizer::Normalizer;
use crate::traits::{ItemSink, ItemSource, Publisher};
use crate::types::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Process-level driver: holds the shared collaborators, spawns one
/// acquisition loop per configured session and restarts loops that exit
/// fatally. Sessions stay fully isolated; each gets its own batcher and
/// dedup cache, and nothing is shared between them but the pooled sinks.
pub struct Supervisor {
    source: Arc<dyn ItemSource>,
    store: Arc<dyn ItemSink>,
    publisher: Arc<dyn Publisher>,
    analyzer: Arc<SentimentAnalyzer>,
}

impl Supervisor {
    pub fn new(
        source: Arc<dyn ItemSource>,
        store: Arc<dyn ItemSink>,
        publisher: Arc<dyn Publisher>,
        analyzer: Arc<SentimentAnalyzer>,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            analyzer,
        }
    }

    /// Validates every session up front (configuration problems are fatal
    /// at startup, never mid-run), then runs the sessions until shutdown.
    pub async fn run(
        &self,
        sessions: Vec<SessionSpec>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        for spec in &sessions {
            spec.validate()?;
        }

        info!(count = sessions.len(), "starting sessions");
        let mut tasks = Vec::new();
        for spec in sessions {
            let task = SessionTask {
                source: self.source.clone(),
                store: self.store.clone(),
                publisher: self.publisher.clone(),
                analyzer: self.analyzer.clone(),
                spec,
                shutdown: shutdown.clone(),
            };
            tasks.push(tokio::spawn(task.run()));
        }

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "session task aborted");
            }
        }
        Ok(())
    }
}

struct SessionTask {
    source: Arc<dyn ItemSource>,
    store: Arc<dyn ItemSink>,
    publisher: Arc<dyn Publisher>,
    analyzer: Arc<SentimentAnalyzer>,
    spec: SessionSpec,
    shutdown: watch::Receiver<bool>,
}

impl SessionTask {
    async fn run(mut self) {
        let label = self.spec.describe();
        loop {
            let outcome = self.spawn_session().await;
            if *self.shutdown.borrow() {
                break;
            }
            match outcome {
                Ok(Ok(())) => warn!(session = %label, "session ended unexpectedly, restarting"),
                Ok(Err(e)) => error!(session = %label, error = %e, "session failed, restarting"),
                Err(e) => error!(session = %label, error = %e, "session panicked, restarting"),
            }
            if !sleep_unless_shutdown(RESTART_DELAY, &mut self.shutdown).await {
                break;
            }
        }
        info!(session = %label, "session stopped");
    }

    /// Runs one incarnation of the session on its own task, so a panic is
    /// contained and reported instead of taking the restart loop down.
    fn spawn_session(&self) -> JoinHandle<Result<()>> {
        let batcher = Batcher::new(
            self.spec.batch_size(),
            self.store.clone(),
            self.publisher.clone(),
        );
        let normalizer = Normalizer::new(self.analyzer.clone());
        let source = self.source.clone();
        let shutdown = self.shutdown.clone();

        match &self.spec {
            SessionSpec::Stream {
                subreddit, kind, ..
            } => {
                let collector = StreamCollector::new(
                    source,
                    normalizer,
                    batcher,
                    subreddit.clone(),
                    *kind,
                );
                tokio::spawn(collector.run(shutdown))
            }
            SessionSpec::Poll {
                keywords,
                subreddits,
                poll_interval,
                ..
            } => {
                let collector = PollCollector::new(
                    source,
                    normalizer,
                    batcher,
                    keywords.clone(),
                    subreddits.clone(),
                    *poll_interval,
                );
                tokio::spawn(collector.run(shutdown))
            }
        }
    }
}
