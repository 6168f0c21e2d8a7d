//! In-memory X API for testing
//!
//! Available in all builds so integration tests and downstream crates can
//! exercise the client without credentials or network access. Failures can
//! be scripted per operation and are returned before the operation runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::model::{
    ActionResult, ApiResponse, ApiTweet, ApiUser, CreatedTweet, Includes, Meta, PageRequest,
    ReferencedTweet,
};
use super::XApi;
use crate::error::{ApiError, RateLimitHeaders, Result};

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Default)]
struct MockState {
    me: Option<ApiUser>,
    users: Vec<ApiUser>,
    tweets: Vec<ApiTweet>,
    lists: HashMap<String, Vec<String>>,
    likes: HashSet<(String, String)>,
    retweets: HashSet<(String, String)>,
    follows: HashSet<(String, String)>,
    failures: HashMap<String, VecDeque<ApiError>>,
    calls: HashMap<String, usize>,
    created_replies: Vec<(String, Option<String>)>,
    next_id: u64,
}

/// Scriptable in-memory implementation of [`XApi`]
///
/// Clones share state, so a test can keep a handle for assertions while the
/// client owns another.
#[derive(Debug, Clone, Default)]
pub struct MockXApi {
    state: Arc<Mutex<MockState>>,
}

impl MockXApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock whose authenticated user is `me`
    pub fn with_me(me: ApiUser) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.lock();
            state.users.push(me.clone());
            state.me = Some(me);
        }
        mock
    }

    pub fn add_user(&self, user: ApiUser) {
        self.lock().users.push(user);
    }

    pub fn add_tweet(&self, tweet: ApiTweet) {
        self.lock().tweets.push(tweet);
    }

    pub fn add_list(&self, list_id: &str, tweet_ids: &[&str]) {
        self.lock().lists.insert(
            list_id.to_string(),
            tweet_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    /// Queue `error` to be returned by the next call to `operation`
    pub fn fail_next(&self, operation: &str, error: ApiError) {
        self.lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Queue `times` rate-limit rejections for `operation`
    pub fn rate_limit_next(&self, operation: &str, times: usize, reset: Option<i64>) {
        for _ in 0..times {
            self.fail_next(operation, rate_limit_error(reset));
        }
    }

    /// Number of times `operation` has been called
    pub fn calls(&self, operation: &str) -> usize {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Text and reply target of every created tweet, in order
    pub fn created(&self) -> Vec<(String, Option<String>)> {
        self.lock().created_replies.clone()
    }

    pub fn is_liked(&self, user_id: &str, tweet_id: &str) -> bool {
        self.lock()
            .likes
            .contains(&(user_id.to_string(), tweet_id.to_string()))
    }

    pub fn is_following(&self, user_id: &str, target_user_id: &str) -> bool {
        self.lock()
            .follows
            .contains(&(user_id.to_string(), target_user_id.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and pop a scripted failure, if any
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        *state.calls.entry(operation.to_string()).or_insert(0) += 1;
        if let Some(error) = state
            .failures
            .get_mut(operation)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error.into());
        }
        Ok(state)
    }
}

/// A 429 as the real transport would report it
pub fn rate_limit_error(reset: Option<i64>) -> ApiError {
    ApiError::Http {
        status: 429,
        message: "HTTP 429: Too Many Requests".to_string(),
        rate_limit: reset.map(|reset| RateLimitHeaders {
            limit: Some(300),
            remaining: Some(0),
            reset: Some(reset.to_string()),
        }),
    }
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::Http {
        status: 404,
        message: format!("HTTP 404: Not Found - no {} with id {}", what, id),
        rate_limit: None,
    }
}

fn page_of(
    state: &MockState,
    tweets: Vec<ApiTweet>,
    page: &PageRequest,
) -> ApiResponse<Vec<ApiTweet>> {
    let size = page
        .max_results
        .map(|max| max as usize)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1);
    let start: usize = page
        .token
        .as_deref()
        .and_then(|token| token.parse().ok())
        .unwrap_or(0);
    let items: Vec<ApiTweet> = tweets.iter().skip(start).take(size).cloned().collect();
    let next_token = (start + size < tweets.len()).then(|| (start + size).to_string());

    let authors: HashSet<&str> = items.iter().filter_map(|t| t.author_id.as_deref()).collect();
    let users = state
        .users
        .iter()
        .filter(|user| authors.contains(user.id.as_str()))
        .cloned()
        .collect();

    ApiResponse {
        meta: Some(Meta {
            result_count: Some(items.len() as u64),
            next_token,
            ..Default::default()
        }),
        includes: Some(Includes {
            users,
            tweets: Vec::new(),
        }),
        data: Some(items),
        errors: None,
    }
}

fn action(result: ActionResult) -> Result<ApiResponse<ActionResult>> {
    Ok(ApiResponse::with_data(result))
}

#[async_trait]
impl XApi for MockXApi {
    async fn me(&self) -> Result<ApiResponse<ApiUser>> {
        let state = self.enter("me")?;
        let me = state.me.clone().ok_or_else(|| ApiError::Http {
            status: 403,
            message: "HTTP 403: Forbidden - user context required".to_string(),
            rate_limit: None,
        })?;
        Ok(ApiResponse::with_data(me))
    }

    async fn user_by_username(&self, username: &str) -> Result<ApiResponse<ApiUser>> {
        let state = self.enter("user_by_username")?;
        let user = state
            .users
            .iter()
            .find(|user| user.username.eq_ignore_ascii_case(username))
            .cloned()
            .ok_or_else(|| not_found("user", username))?;
        Ok(ApiResponse::with_data(user))
    }

    async fn user_by_id(&self, id: &str) -> Result<ApiResponse<ApiUser>> {
        let state = self.enter("user_by_id")?;
        let user = state
            .users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| not_found("user", id))?;
        Ok(ApiResponse::with_data(user))
    }

    async fn tweet(&self, id: &str) -> Result<ApiResponse<ApiTweet>> {
        let state = self.enter("tweet")?;
        let tweet = state
            .tweets
            .iter()
            .find(|tweet| tweet.id == id)
            .cloned()
            .ok_or_else(|| not_found("tweet", id))?;
        let users = state
            .users
            .iter()
            .filter(|user| Some(&user.id) == tweet.author_id.as_ref())
            .cloned()
            .collect();
        let mut response = ApiResponse::with_data(tweet);
        response.includes = Some(Includes {
            users,
            tweets: Vec::new(),
        });
        Ok(response)
    }

    async fn user_tweets(
        &self,
        user_id: &str,
        page: &PageRequest,
    ) -> Result<ApiResponse<Vec<ApiTweet>>> {
        let state = self.enter("user_tweets")?;
        let tweets = state
            .tweets
            .iter()
            .filter(|tweet| tweet.author_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        Ok(page_of(&state, tweets, page))
    }

    async fn list_tweets(
        &self,
        list_id: &str,
        page: &PageRequest,
    ) -> Result<ApiResponse<Vec<ApiTweet>>> {
        let state = self.enter("list_tweets")?;
        let ids = state
            .lists
            .get(list_id)
            .cloned()
            .ok_or_else(|| not_found("list", list_id))?;
        let tweets = state
            .tweets
            .iter()
            .filter(|tweet| ids.contains(&tweet.id))
            .cloned()
            .collect();
        Ok(page_of(&state, tweets, page))
    }

    async fn search_recent(
        &self,
        query: &str,
        page: &PageRequest,
    ) -> Result<ApiResponse<Vec<ApiTweet>>> {
        let state = self.enter("search_recent")?;
        let needle = query.to_lowercase();
        let tweets = state
            .tweets
            .iter()
            .filter(|tweet| tweet.text.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Ok(page_of(&state, tweets, page))
    }

    async fn create_tweet(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<ApiResponse<CreatedTweet>> {
        let mut state = self.enter("create_tweet")?;
        state.next_id += 1;
        let id = format!("9{:05}", state.next_id);
        let author_id = state.me.as_ref().map(|me| me.id.clone());
        state.tweets.push(ApiTweet {
            id: id.clone(),
            text: text.to_string(),
            author_id,
            referenced_tweets: reply_to.map(|parent| {
                vec![ReferencedTweet {
                    kind: "replied_to".to_string(),
                    id: parent.to_string(),
                }]
            }),
            ..Default::default()
        });
        state
            .created_replies
            .push((text.to_string(), reply_to.map(str::to_string)));
        Ok(ApiResponse::with_data(CreatedTweet {
            id,
            text: text.to_string(),
        }))
    }

    async fn delete_tweet(&self, id: &str) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("delete_tweet")?;
        let before = state.tweets.len();
        state.tweets.retain(|tweet| tweet.id != id);
        action(ActionResult {
            deleted: Some(state.tweets.len() < before),
            ..Default::default()
        })
    }

    async fn like(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("like")?;
        state
            .likes
            .insert((user_id.to_string(), tweet_id.to_string()));
        action(ActionResult {
            liked: Some(true),
            ..Default::default()
        })
    }

    async fn unlike(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("unlike")?;
        state
            .likes
            .remove(&(user_id.to_string(), tweet_id.to_string()));
        action(ActionResult {
            liked: Some(false),
            ..Default::default()
        })
    }

    async fn retweet(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("retweet")?;
        state
            .retweets
            .insert((user_id.to_string(), tweet_id.to_string()));
        action(ActionResult {
            retweeted: Some(true),
            ..Default::default()
        })
    }

    async fn unretweet(
        &self,
        user_id: &str,
        tweet_id: &str,
    ) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("unretweet")?;
        state
            .retweets
            .remove(&(user_id.to_string(), tweet_id.to_string()));
        action(ActionResult {
            retweeted: Some(false),
            ..Default::default()
        })
    }

    async fn follow(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("follow")?;
        state
            .follows
            .insert((user_id.to_string(), target_user_id.to_string()));
        action(ActionResult {
            following: Some(true),
            pending_follow: Some(false),
            ..Default::default()
        })
    }

    async fn unfollow(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<ApiResponse<ActionResult>> {
        let mut state = self.enter("unfollow")?;
        state
            .follows
            .remove(&(user_id.to_string(), target_user_id.to_string()));
        action(ActionResult {
            following: Some(false),
            ..Default::default()
        })
    }
}
