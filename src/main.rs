use clap::{Parser, Subcommand, ValueEnum};
use reddit_collector::{
    fetch_hot_once, AppConfig, Batcher, Broadcaster, ItemKind, ItemStore, Normalizer,
    RedditClient, SentimentAnalyzer, SessionSpec, Supervisor, DEFAULT_BATCH_SIZE,
    DEFAULT_FETCH_LIMIT, DEFAULT_POLL_INTERVAL_SECS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "reddit-collector",
    about = "Collects Reddit posts and comments, scores their sentiment and stores the results"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Post,
    Comment,
}

impl From<KindArg> for ItemKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Post => ItemKind::Post,
            KindArg::Comment => ItemKind::Comment,
        }
    }
}

impl std::fmt::Display for KindArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KindArg::Post => f.write_str("post"),
            KindArg::Comment => f.write_str("comment"),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Stream new items from a subreddit as they appear
    Stream {
        /// Subreddit to stream (e.g. 'python')
        #[arg(short, long)]
        subreddit: String,

        /// Item type to stream
        #[arg(short = 't', long = "type", value_enum, default_value_t = KindArg::Comment)]
        kind: KindArg,

        /// Items to accumulate before a batch insert
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Poll for keywords across subreddits on a fixed interval
    Poll {
        /// Keywords to search for (disjunction)
        #[arg(short, long, num_args = 1.., required = true)]
        keywords: Vec<String>,

        /// Subreddits to search in
        #[arg(short, long, num_args = 1.., default_values_t = vec!["all".to_string()])]
        subreddits: Vec<String>,

        /// Seconds between polls
        #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
        interval: u64,

        /// Items to accumulate before a batch insert
        #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// One bounded fetch of a subreddit's hot posts, then exit
    Fetch {
        /// Subreddit to fetch from
        #[arg(short, long)]
        subreddit: String,

        /// Maximum posts to fetch
        #[arg(short, long, default_value_t = DEFAULT_FETCH_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let store = Arc::new(ItemStore::connect(&config.database_url).await?);
    store.setup_schema().await?;

    let source = Arc::new(RedditClient::new(config.reddit.clone())?);
    let analyzer = Arc::new(SentimentAnalyzer::with_default_model());
    let broadcaster = Arc::new(Broadcaster::new());

    match cli.command {
        Command::Fetch { subreddit, limit } => {
            let normalizer = Normalizer::new(analyzer);
            let mut batcher = Batcher::new(DEFAULT_BATCH_SIZE, store, broadcaster);
            let count =
                fetch_hot_once(source.as_ref(), &normalizer, &mut batcher, &subreddit, limit)
                    .await?;
            info!(subreddit = %subreddit, count, "on-demand fetch finished");
        }
        command => {
            let spec = match command {
                Command::Stream {
                    subreddit,
                    kind,
                    batch_size,
                } => SessionSpec::Stream {
                    subreddit,
                    kind: kind.into(),
                    batch_size,
                },
                Command::Poll {
                    keywords,
                    subreddits,
                    interval,
                    batch_size,
                } => SessionSpec::Poll {
                    keywords,
                    subreddits,
                    batch_size,
                    poll_interval: Duration::from_secs(interval),
                },
                Command::Fetch { .. } => unreachable!(),
            };

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received, draining sessions");
                    let _ = shutdown_tx.send(true);
                }
            });

            let supervisor = Supervisor::new(source, store, broadcaster, analyzer);
            supervisor.run(vec![spec], shutdown_rx).await?;
        }
    }

    Ok(())
}
