//! Wire types for the X API v2 response envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard v2 response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub includes: Option<Includes>,
    pub meta: Option<Meta>,
    pub errors: Option<Vec<ApiProblem>>,
}

impl<T> ApiResponse<T> {
    pub fn with_data(data: T) -> Self {
        Self {
            data: Some(data),
            includes: None,
            meta: None,
            errors: None,
        }
    }

    pub fn next_token(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.next_token.as_deref())
    }

    /// Human-readable summary of the `errors` array, if any
    pub fn problem_summary(&self) -> Option<String> {
        let errors = self.errors.as_ref().filter(|errors| !errors.is_empty())?;
        Some(
            errors
                .iter()
                .map(ApiProblem::message)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Denormalized entities referenced from `data`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<ApiUser>,
    #[serde(default)]
    pub tweets: Vec<ApiTweet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub result_count: Option<u64>,
    pub next_token: Option<String>,
    pub newest_id: Option<String>,
    pub oldest_id: Option<String>,
}

/// Entry of the `errors` array (partial errors or problem details)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiProblem {
    pub title: Option<String>,
    pub detail: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub resource_id: Option<String>,
}

impl ApiProblem {
    pub fn message(&self) -> String {
        match (&self.title, &self.detail) {
            (Some(title), Some(detail)) => format!("{}: {}", title, detail),
            (None, Some(detail)) => detail.clone(),
            (Some(title), None) => title.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiUser {
    pub id: String,
    pub name: String,
    pub username: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub verified: Option<bool>,
    pub public_metrics: Option<ApiUserMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiUserMetrics {
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub tweet_count: u64,
    #[serde(default)]
    pub listed_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiTweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
    pub referenced_tweets: Option<Vec<ReferencedTweet>>,
    pub public_metrics: Option<ApiTweetMetrics>,
}

impl ApiTweet {
    /// Id of the tweet this one replies to
    pub fn replied_to(&self) -> Option<&str> {
        self.referenced_tweets
            .as_ref()?
            .iter()
            .find(|reference| reference.kind == "replied_to")
            .map(|reference| reference.id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiTweetMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
    #[serde(default)]
    pub bookmark_count: u64,
    #[serde(default)]
    pub impression_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedTweet {
    pub id: String,
    pub text: String,
}

/// Result body of like/repost/follow/delete style actions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub liked: Option<bool>,
    pub retweeted: Option<bool>,
    pub following: Option<bool>,
    pub pending_follow: Option<bool>,
    pub deleted: Option<bool>,
}

/// Paging parameters for timeline-style endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub max_results: Option<u32>,
    pub token: Option<String>,
}
