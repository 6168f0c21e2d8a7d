//! Typed X client
//!
//! [`XpulseClient`] is what the CLI and library consumers use. Each remote
//! call goes through the [`RateLimitedExecutor`] under one of the labels in
//! [`endpoints`], so rate-limit state is tracked per logical operation rather
//! than per URL.
//!
//! # Examples
//!
//! ```no_run
//! use libxpulse::{Config, XpulseClient};
//!
//! # async fn example() -> libxpulse::Result<()> {
//! let config = Config::load()?;
//! let client = XpulseClient::from_config(&config)?;
//!
//! let me = client.me().await?;
//! let report = client.pulse(None, 20).await?;
//! println!("{} is rated {}", me.username, report.rating);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::http::HttpXApi;
use crate::api::{ApiResponse, ApiTweet, Includes, Meta, PageRequest, XApi};
use crate::config::{AuthMode, Config, ENV_ACCESS_TOKEN};
use crate::error::{ApiError, Cancelled, ConfigError, Result, XpulseError};
use crate::metrics::{self, PulseReport, TweetMetrics};
use crate::rate_limit::{RateLimitState, RateLimitedExecutor};
use crate::types::{PostedTweet, Tweet, User};

pub const MAX_TWEET_CHARS: usize = 280;
const MAX_USERNAME_CHARS: usize = 15;
const MAX_PAGE_SIZE: u32 = 100;

/// Rate-limit labels used by [`XpulseClient`]
pub mod endpoints {
    pub const USERS_ME: &str = "users.me";
    pub const USERS_BY_USERNAME: &str = "users.by_username";
    pub const TWEETS_LOOKUP: &str = "tweets.lookup";
    pub const USERS_TWEETS: &str = "users.tweets";
    pub const LISTS_TWEETS: &str = "lists.tweets";
    pub const SEARCH: &str = "search";
    pub const POST_CREATE: &str = "post.create";
    pub const POST_DELETE: &str = "post.delete";
    pub const LIKES: &str = "likes";
    pub const REPOSTS: &str = "reposts";
    pub const FOLLOWS: &str = "follows";
}

pub struct XpulseClient {
    api: Arc<dyn XApi>,
    executor: RateLimitedExecutor,
    auth_mode: AuthMode,
    cancel: Option<CancellationToken>,
    thread_delay: Duration,
    my_id: OnceCell<String>,
}

impl XpulseClient {
    pub fn new(api: Arc<dyn XApi>, executor: RateLimitedExecutor, auth_mode: AuthMode) -> Self {
        Self {
            api,
            executor,
            auth_mode,
            cancel: None,
            thread_delay: Duration::from_millis(1_000),
            my_id: OnceCell::new(),
        }
    }

    /// Build a client over the HTTP transport.
    ///
    /// Fails before any remote call when credentials are missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = config.require_credentials()?;
        let api = HttpXApi::from_config(config)?;
        let executor = RateLimitedExecutor::new(config.rate_limit.to_retry_config());

        Ok(Self::new(Arc::new(api), executor, credentials.mode())
            .with_thread_delay(Duration::from_millis(config.thread.delay_ms)))
    }

    /// Make backoff waits and thread pauses abortable through `token`
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_thread_delay(mut self, delay: Duration) -> Self {
        self.thread_delay = delay;
        self
    }

    pub fn executor(&self) -> &RateLimitedExecutor {
        &self.executor
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    /// Snapshot of every endpoint's rate-limit state seen so far
    pub fn rate_limits(&self) -> Vec<RateLimitState> {
        self.executor.store().snapshot()
    }

    async fn call<T, F, Fut>(&self, endpoint: &'static str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_not_cancelled(endpoint)?;
        self.executor
            .execute_with(endpoint, self.executor.config(), self.cancel.as_ref(), op)
            .await
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// The authenticated account
    pub async fn me(&self) -> Result<User> {
        let response = self.call(endpoints::USERS_ME, || self.api.me()).await?;
        let (user, _, _) = expect_data(response, "users/me")?;
        Ok(user.into())
    }

    pub async fn user(&self, username: &str) -> Result<User> {
        let username = normalize_username(username)?;
        let response = self
            .call(endpoints::USERS_BY_USERNAME, || {
                self.api.user_by_username(&username)
            })
            .await?;
        let (user, _, _) = expect_data(response, "users/by/username")?;
        Ok(user.into())
    }

    async fn my_id(&self) -> Result<String> {
        self.my_id
            .get_or_try_init(|| async { Ok::<_, XpulseError>(self.me().await?.id) })
            .await
            .cloned()
    }

    // ========================================================================
    // Reading tweets
    // ========================================================================

    pub async fn tweet(&self, id: &str) -> Result<Tweet> {
        validate_id(id, "tweet id")?;
        let response = self
            .call(endpoints::TWEETS_LOOKUP, || self.api.tweet(id))
            .await?;
        let (tweet, includes, _) = expect_data(response, "tweets")?;
        Ok(Tweet::from_api(tweet, includes.as_ref()))
    }

    /// Most recent tweets of a user id, newest first
    pub async fn user_tweets(&self, user_id: &str, limit: usize) -> Result<Vec<Tweet>> {
        validate_id(user_id, "user id")?;
        self.collect_tweets(Listing::User(user_id), limit, usize::MAX)
            .await
    }

    /// Most recent tweets of `username`
    pub async fn timeline(&self, username: &str, limit: usize) -> Result<Vec<Tweet>> {
        let user = self.user(username).await?;
        self.user_tweets(&user.id, limit).await
    }

    pub async fn list_tweets(&self, list_id: &str, limit: usize) -> Result<Vec<Tweet>> {
        validate_id(list_id, "list id")?;
        self.collect_tweets(Listing::List(list_id), limit, usize::MAX)
            .await
    }

    /// Recent search, following `next_token` for at most `max_pages` pages
    pub async fn search(&self, query: &str, limit: usize, max_pages: usize) -> Result<Vec<Tweet>> {
        if query.trim().is_empty() {
            return Err(XpulseError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }
        self.collect_tweets(Listing::Search(query), limit, max_pages)
            .await
    }

    async fn collect_tweets(
        &self,
        listing: Listing<'_>,
        limit: usize,
        max_pages: usize,
    ) -> Result<Vec<Tweet>> {
        let mut tweets = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;

        while tweets.len() < limit && pages < max_pages {
            let wanted = (limit - tweets.len()).min(MAX_PAGE_SIZE as usize) as u32;
            let page = PageRequest {
                max_results: Some(wanted.max(listing.min_page_size())),
                token: token.take(),
            };

            let response = self
                .call(listing.endpoint(), || match listing {
                    Listing::User(id) => self.api.user_tweets(id, &page),
                    Listing::List(id) => self.api.list_tweets(id, &page),
                    Listing::Search(query) => self.api.search_recent(query, &page),
                })
                .await?;
            pages += 1;

            let next = response.next_token().map(str::to_string);
            let (items, includes) = page_data(response)?;
            debug!(
                endpoint = listing.endpoint(),
                page = pages,
                items = items.len(),
                "Fetched page"
            );
            tweets.extend(
                items
                    .into_iter()
                    .map(|tweet| Tweet::from_api(tweet, includes.as_ref())),
            );

            match next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tweets.truncate(limit);
        Ok(tweets)
    }

    // ========================================================================
    // Writing
    // ========================================================================

    pub async fn post(&self, text: &str) -> Result<PostedTweet> {
        self.require_user_context()?;
        validate_text(text)?;
        self.create(text, None).await
    }

    pub async fn reply(&self, tweet_id: &str, text: &str) -> Result<PostedTweet> {
        self.require_user_context()?;
        validate_id(tweet_id, "tweet id")?;
        validate_text(text)?;
        self.create(text, Some(tweet_id)).await
    }

    /// Post `texts` as a thread, each reply chained to the previous post.
    ///
    /// All texts are validated before anything is posted. Posts go out one
    /// at a time with the configured delay between them.
    pub async fn post_thread(&self, texts: &[String]) -> Result<Vec<PostedTweet>> {
        self.require_user_context()?;
        if texts.is_empty() {
            return Err(XpulseError::InvalidInput(
                "Thread must contain at least one post".to_string(),
            ));
        }
        for (index, text) in texts.iter().enumerate() {
            validate_text(text).map_err(|e| match e {
                XpulseError::InvalidInput(message) => XpulseError::InvalidInput(format!(
                    "post {} of thread: {}",
                    index + 1,
                    message
                )),
                other => other,
            })?;
        }

        let mut posted: Vec<PostedTweet> = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            if index > 0 {
                self.pause_between_posts().await?;
            }
            let reply_to = posted.last().map(|p| p.id.clone());
            match self.create(text, reply_to.as_deref()).await {
                Ok(tweet) => {
                    info!(index = index + 1, id = %tweet.id, "Posted thread item");
                    posted.push(tweet);
                }
                Err(e) => {
                    warn!(
                        "Thread stopped after {} of {} posts: {}",
                        posted.len(),
                        texts.len(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(posted)
    }

    async fn create(&self, text: &str, reply_to: Option<&str>) -> Result<PostedTweet> {
        let response = self
            .call(endpoints::POST_CREATE, || self.api.create_tweet(text, reply_to))
            .await?;
        let (created, _, _) = expect_data(response, "tweets")?;
        Ok(PostedTweet {
            id: created.id,
            text: created.text,
        })
    }

    fn ensure_not_cancelled(&self, endpoint: &str) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Cancelled {
                endpoint: endpoint.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn pause_between_posts(&self) -> Result<()> {
        self.ensure_not_cancelled(endpoints::POST_CREATE)?;
        if self.thread_delay.is_zero() {
            return Ok(());
        }
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Cancelled {
                    endpoint: endpoints::POST_CREATE.to_string(),
                }
                .into()),
                _ = sleep(self.thread_delay) => Ok(()),
            },
            None => {
                sleep(self.thread_delay).await;
                Ok(())
            }
        }
    }

    /// Delete one of the authenticated user's posts; true when it was removed
    pub async fn delete(&self, tweet_id: &str) -> Result<bool> {
        self.require_user_context()?;
        validate_id(tweet_id, "tweet id")?;
        let response = self
            .call(endpoints::POST_DELETE, || self.api.delete_tweet(tweet_id))
            .await?;
        let (result, _, _) = expect_data(response, "delete")?;
        Ok(result.deleted.unwrap_or(false))
    }

    pub async fn like(&self, tweet_id: &str) -> Result<bool> {
        let me = self.acting_user(tweet_id).await?;
        let response = self
            .call(endpoints::LIKES, || self.api.like(&me, tweet_id))
            .await?;
        Ok(expect_data(response, "like")?.0.liked.unwrap_or(false))
    }

    pub async fn unlike(&self, tweet_id: &str) -> Result<bool> {
        let me = self.acting_user(tweet_id).await?;
        let response = self
            .call(endpoints::LIKES, || self.api.unlike(&me, tweet_id))
            .await?;
        Ok(!expect_data(response, "unlike")?.0.liked.unwrap_or(true))
    }

    pub async fn repost(&self, tweet_id: &str) -> Result<bool> {
        let me = self.acting_user(tweet_id).await?;
        let response = self
            .call(endpoints::REPOSTS, || self.api.retweet(&me, tweet_id))
            .await?;
        Ok(expect_data(response, "repost")?.0.retweeted.unwrap_or(false))
    }

    pub async fn unrepost(&self, tweet_id: &str) -> Result<bool> {
        let me = self.acting_user(tweet_id).await?;
        let response = self
            .call(endpoints::REPOSTS, || self.api.unretweet(&me, tweet_id))
            .await?;
        Ok(!expect_data(response, "unrepost")?.0.retweeted.unwrap_or(true))
    }

    pub async fn follow(&self, username: &str) -> Result<bool> {
        self.require_user_context()?;
        let target = self.user(username).await?;
        let me = self.my_id().await?;
        let response = self
            .call(endpoints::FOLLOWS, || self.api.follow(&me, &target.id))
            .await?;
        let (result, _, _) = expect_data(response, "follow")?;
        Ok(result.following.unwrap_or(false) || result.pending_follow.unwrap_or(false))
    }

    pub async fn unfollow(&self, username: &str) -> Result<bool> {
        self.require_user_context()?;
        let target = self.user(username).await?;
        let me = self.my_id().await?;
        let response = self
            .call(endpoints::FOLLOWS, || self.api.unfollow(&me, &target.id))
            .await?;
        Ok(!expect_data(response, "unfollow")?.0.following.unwrap_or(true))
    }

    async fn acting_user(&self, tweet_id: &str) -> Result<String> {
        self.require_user_context()?;
        validate_id(tweet_id, "tweet id")?;
        self.my_id().await
    }

    fn require_user_context(&self) -> Result<()> {
        match self.auth_mode {
            AuthMode::User => Ok(()),
            AuthMode::AppOnly => Err(ConfigError::MissingCredential(format!(
                "{} is required for write operations (only an app-only token is configured)",
                ENV_ACCESS_TOKEN
            ))
            .into()),
        }
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    pub async fn metrics(&self, tweet_id: &str) -> Result<TweetMetrics> {
        let tweet = self.tweet(tweet_id).await?;
        Ok(metrics::measure(&tweet))
    }

    /// Pulse check over the last `count` tweets of `username` (default: the
    /// authenticated account)
    pub async fn pulse(&self, username: Option<&str>, count: usize) -> Result<PulseReport> {
        let user = match username {
            Some(username) => self.user(username).await?,
            None => self.me().await?,
        };
        let tweets = self.user_tweets(&user.id, count).await?;
        Ok(metrics::pulse_check(&user.username, &tweets))
    }
}

#[derive(Debug, Clone, Copy)]
enum Listing<'a> {
    User(&'a str),
    List(&'a str),
    Search(&'a str),
}

impl Listing<'_> {
    fn endpoint(&self) -> &'static str {
        match self {
            Listing::User(_) => endpoints::USERS_TWEETS,
            Listing::List(_) => endpoints::LISTS_TWEETS,
            Listing::Search(_) => endpoints::SEARCH,
        }
    }

    /// Smallest `max_results` each endpoint accepts
    fn min_page_size(&self) -> u32 {
        match self {
            Listing::User(_) => 5,
            Listing::List(_) => 1,
            Listing::Search(_) => 10,
        }
    }
}

/// Split an envelope, treating a missing `data` payload as a failure
fn expect_data<T>(
    response: ApiResponse<T>,
    what: &str,
) -> Result<(T, Option<Includes>, Option<Meta>)> {
    let summary = response.problem_summary();
    let ApiResponse {
        data,
        includes,
        meta,
        ..
    } = response;
    match data {
        Some(data) => Ok((data, includes, meta)),
        None => Err(ApiError::Problem(
            summary.unwrap_or_else(|| format!("{} returned no data", what)),
        )
        .into()),
    }
}

/// Listing payload; an empty page comes back without `data`
fn page_data(response: ApiResponse<Vec<ApiTweet>>) -> Result<(Vec<ApiTweet>, Option<Includes>)> {
    if response.data.is_none() {
        if let Some(summary) = response.problem_summary() {
            return Err(ApiError::Problem(summary).into());
        }
    }
    Ok((response.data.unwrap_or_default(), response.includes))
}

pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(XpulseError::InvalidInput(
            "Post text cannot be empty".to_string(),
        ));
    }
    let chars = text.chars().count();
    if chars > MAX_TWEET_CHARS {
        return Err(XpulseError::InvalidInput(format!(
            "Post text exceeds {} characters (current: {})",
            MAX_TWEET_CHARS, chars
        )));
    }
    Ok(())
}

fn validate_id(id: &str, what: &str) -> Result<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(XpulseError::InvalidInput(format!(
            "Invalid {} '{}': expected a numeric id",
            what, id
        )));
    }
    Ok(())
}

fn normalize_username(username: &str) -> Result<String> {
    let name = username.trim().trim_start_matches('@');
    let valid = !name.is_empty()
        && name.chars().count() <= MAX_USERNAME_CHARS
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(XpulseError::InvalidInput(format!(
            "Invalid username '{}'",
            username
        )));
    }
    Ok(name.to_string())
}
