//! Client for the external scheduling service
//!
//! A thin JSON-over-HTTP client. It has no retry or rate-limit handling:
//! every non-2xx response becomes [`SchedulerError::Http`] carrying the
//! method, path, status and raw body.

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, SchedulerError, XpulseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledStatus {
    Pending,
    Posted,
    Failed,
    Cancelled,
    /// Any status this client does not know about
    #[serde(other)]
    Unknown,
}

impl ScheduledStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledStatus::Pending => "pending",
            ScheduledStatus::Posted => "posted",
            ScheduledStatus::Failed => "failed",
            ScheduledStatus::Cancelled => "cancelled",
            ScheduledStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScheduledStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduledStatus {
    type Err = XpulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ScheduledStatus::Pending),
            "posted" => Ok(ScheduledStatus::Posted),
            "failed" => Ok(ScheduledStatus::Failed),
            "cancelled" | "canceled" => Ok(ScheduledStatus::Cancelled),
            _ => Err(XpulseError::InvalidInput(format!(
                "Invalid status '{}'. Valid options: pending, posted, failed, cancelled",
                s
            ))),
        }
    }
}

/// One post to be published at `scheduled_at`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRequest {
    pub text: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchBody<'a> {
    posts: &'a [ScheduleRequest],
}

#[derive(Debug, Serialize)]
struct ThreadBody<'a> {
    posts: &'a [String],
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct CancelBody<'a> {
    id: &'a str,
}

/// A post as tracked by the scheduling service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<ScheduledStatus>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub tweet_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Listings come back either bare or wrapped in `{"posts": [...]}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PostList {
    Wrapped { posts: Vec<ScheduledPost> },
    Bare(Vec<ScheduledPost>),
}

impl From<PostList> for Vec<ScheduledPost> {
    fn from(list: PostList) -> Self {
        match list {
            PostList::Wrapped { posts } => posts,
            PostList::Bare(posts) => posts,
        }
    }
}

pub struct SchedulerClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl SchedulerClient {
    pub fn new(base_url: &str, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("xpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SchedulerError::Transport {
                method: "-".to_string(),
                path: "-".to_string(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Fails fast when the scheduler URL or API key is not configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let (url, key) = config.require_scheduler()?;
        Self::new(
            url,
            SecretString::from(key.to_string()),
            Duration::from_secs(config.api.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Service liveness; unauthenticated
    pub async fn health(&self) -> Result<serde_json::Value> {
        let request = self.http.get(self.url("/health"));
        self.send(Method::GET, "/health", request).await
    }

    pub async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduledPost> {
        let builder = self.authed(Method::POST, "/schedule").json(request);
        self.send(Method::POST, "/schedule", builder).await
    }

    pub async fn schedule_batch(&self, posts: &[ScheduleRequest]) -> Result<Vec<ScheduledPost>> {
        let builder = self
            .authed(Method::POST, "/schedule-batch")
            .json(&BatchBody { posts });
        let list: PostList = self.send(Method::POST, "/schedule-batch", builder).await?;
        Ok(list.into())
    }

    /// Schedule `posts` as one thread, published in order starting at `scheduled_at`
    pub async fn schedule_thread(
        &self,
        posts: &[String],
        scheduled_at: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>> {
        let builder = self
            .authed(Method::POST, "/schedule-thread")
            .json(&ThreadBody {
                posts,
                scheduled_at,
            });
        let list: PostList = self
            .send(Method::POST, "/schedule-thread", builder)
            .await?;
        Ok(list.into())
    }

    pub async fn list_posts(&self, status: Option<ScheduledStatus>) -> Result<Vec<ScheduledPost>> {
        let mut builder = self.authed(Method::GET, "/posts");
        if let Some(status) = status {
            builder = builder.query(&[("status", status.as_str())]);
        }
        let list: PostList = self.send(Method::GET, "/posts", builder).await?;
        Ok(list.into())
    }

    pub async fn cancel(&self, id: &str) -> Result<serde_json::Value> {
        if id.trim().is_empty() {
            return Err(XpulseError::InvalidInput(
                "Scheduled post id cannot be empty".to_string(),
            ));
        }
        let builder = self
            .authed(Method::POST, "/cancel")
            .json(&CancelBody { id });
        self.send(Method::POST, "/cancel", builder).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(self.api_key.expose_secret())
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| SchedulerError::Transport {
                method: method.to_string(),
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        debug!(%method, path, status = status.as_u16(), "Scheduler response");

        let body = response
            .text()
            .await
            .map_err(|e| SchedulerError::Transport {
                method: method.to_string(),
                path: path.to_string(),
                message: e.to_string(),
            })?;

        if !status.is_success() {
            return Err(SchedulerError::Http {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        serde_json::from_str(&body).map_err(|e| {
            SchedulerError::Decode {
                method: method.to_string(),
                path: path.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}
