use crate::config::RedditCredentials;
use crate::traits::ItemSource;
use crate::types::{CollectorError, ItemKind, RawItem, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Operation-level timeout on every upstream call, so a hung pull can never
/// block cancellation indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Bounded result count for every listing query.
const LISTING_LIMIT: usize = 100;
/// How often the live subscription re-polls its listing.
const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Ids remembered inside one subscription to suppress listing overlap.
const STREAM_SEEN_WINDOW: usize = 1_000;
/// Refresh the OAuth token this close to its expiry.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: RawItem,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
    }
}

/// Read-only Reddit API client using the client-credentials OAuth grant.
/// One instance serves every session; the token is cached and refreshed
/// shortly before expiry.
pub struct RedditClient {
    http: Client,
    credentials: RedditCredentials,
    token: RwLock<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials) -> Result<Self> {
        let http = Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            credentials,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if token.is_fresh() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let response = check_status(response, "access_token")?;
        let token: TokenResponse = serde_json::from_str(&response.text().await?)?;

        info!(expires_in = token.expires_in, "refreshed Reddit access token");
        let access_token = token.access_token.clone();
        *guard = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    async fn get_listing(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<RawItem>> {
        let token = self.access_token().await?;
        let url = format!("{}{}", API_BASE, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        let response = check_status(response, path)?;

        // Decode from text so a malformed payload classifies as unexpected
        // rather than a transport error.
        let listing: Listing = serde_json::from_str(&response.text().await?)?;
        let items: Vec<RawItem> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .collect();
        debug!(path, count = items.len(), "fetched listing");
        Ok(items)
    }
}

fn check_status(response: Response, endpoint: &str) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CollectorError::RateLimited);
    }
    if !status.is_success() {
        return Err(CollectorError::Api {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
        });
    }
    Ok(response)
}

#[async_trait]
impl ItemSource for RedditClient {
    /// Polls the subreddit's newest listing and yields only items that
    /// appeared after the subscription opened, oldest first. The first poll
    /// marks what already exists without yielding it.
    fn subscribe(&self, subreddit: &str, kind: ItemKind) -> BoxStream<'_, Result<RawItem>> {
        let path = match kind {
            ItemKind::Post => format!("/r/{}/new", subreddit),
            ItemKind::Comment => format!("/r/{}/comments", subreddit),
        };

        Box::pin(try_stream! {
            let mut seen: HashSet<String> = HashSet::new();
            let mut seen_order: VecDeque<String> = VecDeque::new();
            let mut skip_existing = true;

            loop {
                let query = [("limit", LISTING_LIMIT.to_string())];
                let mut items = self.get_listing(&path, &query).await?;
                items.reverse();

                for item in items {
                    if !seen.insert(item.id.clone()) {
                        continue;
                    }
                    seen_order.push_back(item.id.clone());
                    while seen_order.len() > STREAM_SEEN_WINDOW {
                        if let Some(old) = seen_order.pop_front() {
                            seen.remove(&old);
                        }
                    }
                    if !skip_existing {
                        yield item;
                    }
                }

                skip_existing = false;
                tokio::time::sleep(STREAM_POLL_INTERVAL).await;
            }
        })
    }

    /// One bounded keyword-disjunction search across the subreddit set,
    /// newest first, restricted to the last hour.
    async fn search(&self, keywords: &[String], subreddits: &[String]) -> Result<Vec<RawItem>> {
        let path = format!("/r/{}/search", subreddits.join("+"));
        let query = [
            ("q", keywords.join(" OR ")),
            ("sort", "new".to_string()),
            ("t", "hour".to_string()),
            ("restrict_sr", "on".to_string()),
            ("limit", LISTING_LIMIT.to_string()),
        ];
        self.get_listing(&path, &query).await
    }

    async fn fetch_hot(&self, subreddit: &str, limit: usize) -> Result<Vec<RawItem>> {
        let path = format!("/r/{}/hot", subreddit);
        let query = [("limit", limit.min(LISTING_LIMIT).to_string())];
        let items = self.get_listing(&path, &query).await?;
        Ok(items.into_iter().filter(|item| !item.stickied).collect())
    }
}
