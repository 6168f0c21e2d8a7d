//! X API abstraction
//!
//! [`XApi`] is the seam between xpulse and the remote API. Each method
//! performs exactly one remote call and returns the raw v2 envelope; retry,
//! rate-limit tracking and mapping into local records happen in
//! [`crate::client::XpulseClient`].
//!
//! Implementations:
//! - [`http::HttpXApi`] talks to the real API over reqwest
//! - [`mock::MockXApi`] keeps everything in memory for tests

use async_trait::async_trait;

use crate::error::Result;

pub mod http;
pub mod mock;
pub mod model;

pub use model::{
    ActionResult, ApiProblem, ApiResponse, ApiTweet, ApiTweetMetrics, ApiUser, ApiUserMetrics,
    CreatedTweet, Includes, Meta, PageRequest, ReferencedTweet,
};

/// One remote call per method against the X API v2
///
/// Failures must surface as [`crate::error::ApiError`] so the executor can
/// classify them. Implementations should attach rate-limit headers to
/// `ApiError::Http` whenever the transport exposes them; otherwise reset
/// hints are unavailable and backoff is purely exponential.
#[async_trait]
pub trait XApi: Send + Sync {
    /// The authenticated user (user-context auth only)
    async fn me(&self) -> Result<ApiResponse<ApiUser>>;

    async fn user_by_username(&self, username: &str) -> Result<ApiResponse<ApiUser>>;

    async fn user_by_id(&self, id: &str) -> Result<ApiResponse<ApiUser>>;

    async fn tweet(&self, id: &str) -> Result<ApiResponse<ApiTweet>>;

    async fn user_tweets(&self, user_id: &str, page: &PageRequest)
        -> Result<ApiResponse<Vec<ApiTweet>>>;

    async fn list_tweets(&self, list_id: &str, page: &PageRequest)
        -> Result<ApiResponse<Vec<ApiTweet>>>;

    /// Search the last seven days
    async fn search_recent(&self, query: &str, page: &PageRequest)
        -> Result<ApiResponse<Vec<ApiTweet>>>;

    async fn create_tweet(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<ApiResponse<CreatedTweet>>;

    async fn delete_tweet(&self, id: &str) -> Result<ApiResponse<ActionResult>>;

    async fn like(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>>;

    async fn unlike(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>>;

    async fn retweet(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>>;

    async fn unretweet(&self, user_id: &str, tweet_id: &str)
        -> Result<ApiResponse<ActionResult>>;

    async fn follow(&self, user_id: &str, target_user_id: &str)
        -> Result<ApiResponse<ActionResult>>;

    async fn unfollow(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<ApiResponse<ActionResult>>;
}
