//! reqwest-backed X API transport
//!
//! Every non-2xx response is turned into [`ApiError::Http`] carrying the
//! `x-rate-limit-*` headers, which keeps the executor's reset-hint path live.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::model::{ActionResult, ApiResponse, ApiTweet, ApiUser, CreatedTweet, PageRequest};
use super::XApi;
use crate::config::Config;
use crate::error::{ApiError, RateLimitHeaders, Result};

pub const TWEET_FIELDS: &str =
    "created_at,public_metrics,author_id,conversation_id,referenced_tweets";
pub const USER_FIELDS: &str = "created_at,description,public_metrics,verified";
const EXPANSIONS: &str = "author_id";

const HEADER_LIMIT: &str = "x-rate-limit-limit";
const HEADER_REMAINING: &str = "x-rate-limit-remaining";
const HEADER_RESET: &str = "x-rate-limit-reset";

const MAX_ERROR_BODY_CHARS: usize = 500;

pub struct HttpXApi {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl HttpXApi {
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("xpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build a transport from configuration, failing if no credentials are set
    pub fn from_config(config: &Config) -> Result<Self> {
        let credentials = config.require_credentials()?;
        Self::new(
            &config.api.base_url,
            credentials.token().clone(),
            Duration::from_secs(config.api.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.token.expose_secret())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiResponse<T>> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "X API response");

        if !status.is_success() {
            let rate_limit = rate_limit_headers(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(http_error(status, rate_limit, &body).into());
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        if envelope.data.is_none() {
            if let Some(summary) = envelope.problem_summary() {
                return Err(ApiError::Problem(summary).into());
            }
        }

        Ok(envelope)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<ApiResponse<T>> {
        self.send(self.request(Method::POST, path).json(&body)).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        self.send(self.request(Method::DELETE, path)).await
    }
}

fn user_query() -> Vec<(&'static str, String)> {
    vec![("user.fields", USER_FIELDS.to_string())]
}

fn tweet_query(page: Option<(&PageRequest, &'static str)>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("tweet.fields", TWEET_FIELDS.to_string()),
        ("expansions", EXPANSIONS.to_string()),
        ("user.fields", "username".to_string()),
    ];
    if let Some((page, token_param)) = page {
        if let Some(max) = page.max_results {
            query.push(("max_results", max.to_string()));
        }
        if let Some(token) = &page.token {
            query.push((token_param, token.clone()));
        }
    }
    query
}

/// Extract `x-rate-limit-*` headers; `None` when the response carried none of them
pub fn rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitHeaders> {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
    };

    let parsed = RateLimitHeaders {
        limit: text(HEADER_LIMIT).and_then(|v| v.parse().ok()),
        remaining: text(HEADER_REMAINING).and_then(|v| v.parse().ok()),
        reset: text(HEADER_RESET),
    };

    if parsed == RateLimitHeaders::default() {
        None
    } else {
        Some(parsed)
    }
}

/// Build the error for a non-2xx response.
///
/// The message always starts with `HTTP <code>: <reason>` so rate-limit
/// classification by message keeps working.
pub fn http_error(status: StatusCode, rate_limit: Option<RateLimitHeaders>, body: &str) -> ApiError {
    let reason = status.canonical_reason().unwrap_or("Unknown Status");
    let mut message = format!("HTTP {}: {}", status.as_u16(), reason);

    let body = body.trim();
    if !body.is_empty() {
        message.push_str(" - ");
        message.extend(body.chars().take(MAX_ERROR_BODY_CHARS));
    }

    ApiError::Http {
        status: status.as_u16(),
        message,
        rate_limit,
    }
}

#[async_trait]
impl XApi for HttpXApi {
    async fn me(&self) -> Result<ApiResponse<ApiUser>> {
        self.get("/users/me", &user_query()).await
    }

    async fn user_by_username(&self, username: &str) -> Result<ApiResponse<ApiUser>> {
        self.get(&format!("/users/by/username/{}", username), &user_query())
            .await
    }

    async fn user_by_id(&self, id: &str) -> Result<ApiResponse<ApiUser>> {
        self.get(&format!("/users/{}", id), &user_query()).await
    }

    async fn tweet(&self, id: &str) -> Result<ApiResponse<ApiTweet>> {
        self.get(&format!("/tweets/{}", id), &tweet_query(None)).await
    }

    async fn user_tweets(
        &self,
        user_id: &str,
        page: &PageRequest,
    ) -> Result<ApiResponse<Vec<ApiTweet>>> {
        self.get(
            &format!("/users/{}/tweets", user_id),
            &tweet_query(Some((page, "pagination_token"))),
        )
        .await
    }

    async fn list_tweets(
        &self,
        list_id: &str,
        page: &PageRequest,
    ) -> Result<ApiResponse<Vec<ApiTweet>>> {
        self.get(
            &format!("/lists/{}/tweets", list_id),
            &tweet_query(Some((page, "pagination_token"))),
        )
        .await
    }

    async fn search_recent(
        &self,
        query: &str,
        page: &PageRequest,
    ) -> Result<ApiResponse<Vec<ApiTweet>>> {
        let mut params = tweet_query(Some((page, "next_token")));
        params.push(("query", query.to_string()));
        self.get("/tweets/search/recent", &params).await
    }

    async fn create_tweet(
        &self,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<ApiResponse<CreatedTweet>> {
        let body = match reply_to {
            Some(id) => json!({ "text": text, "reply": { "in_reply_to_tweet_id": id } }),
            None => json!({ "text": text }),
        };
        self.post_json("/tweets", body).await
    }

    async fn delete_tweet(&self, id: &str) -> Result<ApiResponse<ActionResult>> {
        self.delete(&format!("/tweets/{}", id)).await
    }

    async fn like(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>> {
        self.post_json(
            &format!("/users/{}/likes", user_id),
            json!({ "tweet_id": tweet_id }),
        )
        .await
    }

    async fn unlike(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>> {
        self.delete(&format!("/users/{}/likes/{}", user_id, tweet_id))
            .await
    }

    async fn retweet(&self, user_id: &str, tweet_id: &str) -> Result<ApiResponse<ActionResult>> {
        self.post_json(
            &format!("/users/{}/retweets", user_id),
            json!({ "tweet_id": tweet_id }),
        )
        .await
    }

    async fn unretweet(
        &self,
        user_id: &str,
        tweet_id: &str,
    ) -> Result<ApiResponse<ActionResult>> {
        self.delete(&format!("/users/{}/retweets/{}", user_id, tweet_id))
            .await
    }

    async fn follow(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<ApiResponse<ActionResult>> {
        self.post_json(
            &format!("/users/{}/following", user_id),
            json!({ "target_user_id": target_user_id }),
        )
        .await
    }

    async fn unfollow(
        &self,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<ApiResponse<ActionResult>> {
        self.delete(&format!("/users/{}/following/{}", user_id, target_user_id))
            .await
    }
}
