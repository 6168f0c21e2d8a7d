//! Core types for xpulse
//!
//! Local records produced from API envelopes. These are what the CLI prints
//! and what library consumers work with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiTweet, ApiUser, Includes};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub verified: bool,
    pub followers: u64,
    pub following: u64,
    pub tweets: u64,
    pub listed: u64,
}

impl From<ApiUser> for User {
    fn from(user: ApiUser) -> Self {
        let metrics = user.public_metrics.unwrap_or_default();
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            description: user.description.filter(|d| !d.is_empty()),
            created_at: user.created_at,
            verified: user.verified.unwrap_or(false),
            followers: metrics.followers_count,
            following: metrics.following_count,
            tweets: metrics.tweet_count,
            listed: metrics.listed_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMetrics {
    pub impressions: u64,
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
    pub bookmarks: u64,
}

impl PublicMetrics {
    /// Likes, retweets, replies, quotes and bookmarks combined
    pub fn engagements(&self) -> u64 {
        self.likes + self.retweets + self.replies + self.quotes + self.bookmarks
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_username: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub metrics: PublicMetrics,
}

impl Tweet {
    /// Map an API tweet, resolving the author's username from `includes`
    pub fn from_api(tweet: ApiTweet, includes: Option<&Includes>) -> Self {
        let author_username = tweet.author_id.as_ref().and_then(|author_id| {
            includes?
                .users
                .iter()
                .find(|user| &user.id == author_id)
                .map(|user| user.username.clone())
        });
        let in_reply_to = tweet.replied_to().map(str::to_string);
        let metrics = tweet.public_metrics.unwrap_or_default();

        Self {
            id: tweet.id,
            text: tweet.text,
            author_id: tweet.author_id,
            author_username,
            created_at: tweet.created_at,
            conversation_id: tweet.conversation_id,
            in_reply_to,
            metrics: PublicMetrics {
                impressions: metrics.impression_count,
                likes: metrics.like_count,
                retweets: metrics.retweet_count,
                replies: metrics.reply_count,
                quotes: metrics.quote_count,
                bookmarks: metrics.bookmark_count,
            },
        }
    }

    /// Public URL, when the author is known
    pub fn url(&self) -> Option<String> {
        self.author_username
            .as_ref()
            .map(|username| format!("https://x.com/{}/status/{}", username, self.id))
    }
}

/// Outcome of a successful post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedTweet {
    pub id: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiTweetMetrics, ApiUserMetrics, ReferencedTweet};

    #[test]
    fn test_user_from_api() {
        let user = User::from(ApiUser {
            id: "1".to_string(),
            name: "Ada".to_string(),
            username: "ada".to_string(),
            description: Some(String::new()),
            created_at: None,
            verified: None,
            public_metrics: Some(ApiUserMetrics {
                followers_count: 10,
                following_count: 2,
                tweet_count: 40,
                listed_count: 1,
            }),
        });
        assert_eq!(user.followers, 10);
        assert_eq!(user.tweets, 40);
        assert!(!user.verified);
        assert!(user.description.is_none());
    }

    #[test]
    fn test_tweet_resolves_author_and_reply() {
        let includes = Includes {
            users: vec![ApiUser {
                id: "7".to_string(),
                name: "Seven".to_string(),
                username: "seven".to_string(),
                ..Default::default()
            }],
            tweets: vec![],
        };
        let tweet = Tweet::from_api(
            ApiTweet {
                id: "100".to_string(),
                text: "hi".to_string(),
                author_id: Some("7".to_string()),
                referenced_tweets: Some(vec![ReferencedTweet {
                    kind: "replied_to".to_string(),
                    id: "99".to_string(),
                }]),
                public_metrics: Some(ApiTweetMetrics {
                    impression_count: 1000,
                    bookmark_count: 12,
                    like_count: 30,
                    ..Default::default()
                }),
                ..Default::default()
            },
            Some(&includes),
        );

        assert_eq!(tweet.author_username.as_deref(), Some("seven"));
        assert_eq!(tweet.in_reply_to.as_deref(), Some("99"));
        assert_eq!(tweet.metrics.bookmarks, 12);
        assert_eq!(tweet.metrics.engagements(), 42);
        assert_eq!(tweet.url().unwrap(), "https://x.com/seven/status/100");
    }

    #[test]
    fn test_tweet_without_includes() {
        let tweet = Tweet::from_api(
            ApiTweet {
                id: "1".to_string(),
                text: "t".to_string(),
                author_id: Some("7".to_string()),
                ..Default::default()
            },
            None,
        );
        assert!(tweet.author_username.is_none());
        assert!(tweet.url().is_none());
        assert_eq!(tweet.metrics, PublicMetrics::default());
    }
}
