//! Derived engagement metrics
//!
//! Bookmark rate (bookmarks per impression, as a percentage) is the main
//! quality signal: people bookmark what they intend to come back to.

use serde::Serialize;
use std::fmt;

use crate::types::Tweet;

/// Bookmarks as a percentage of impressions; 0 when there are no impressions
pub fn bookmark_rate(bookmarks: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    bookmarks as f64 * 100.0 / impressions as f64
}

/// Engagements as a percentage of impressions; 0 when there are no impressions
pub fn engagement_rate(engagements: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    engagements as f64 * 100.0 / impressions as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Exceptional,
    Good,
    Ok,
    Failed,
}

impl Rating {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= 8.0 {
            Rating::Exceptional
        } else if rate >= 5.0 {
            Rating::Good
        } else if rate >= 2.0 {
            Rating::Ok
        } else {
            Rating::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Exceptional => "exceptional",
            Rating::Good => "good",
            Rating::Ok => "ok",
            Rating::Failed => "failed",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured performance of a single tweet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TweetMetrics {
    pub tweet_id: String,
    pub text: String,
    pub impressions: u64,
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
    pub bookmarks: u64,
    pub bookmark_rate: f64,
    pub engagement_rate: f64,
    pub rating: Rating,
}

pub fn measure(tweet: &Tweet) -> TweetMetrics {
    let m = &tweet.metrics;
    let rate = bookmark_rate(m.bookmarks, m.impressions);
    TweetMetrics {
        tweet_id: tweet.id.clone(),
        text: tweet.text.clone(),
        impressions: m.impressions,
        likes: m.likes,
        retweets: m.retweets,
        replies: m.replies,
        quotes: m.quotes,
        bookmarks: m.bookmarks,
        bookmark_rate: rate,
        engagement_rate: engagement_rate(m.engagements(), m.impressions),
        rating: Rating::from_rate(rate),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RatingCounts {
    pub exceptional: usize,
    pub good: usize,
    pub ok: usize,
    pub failed: usize,
}

impl RatingCounts {
    fn record(&mut self, rating: Rating) {
        match rating {
            Rating::Exceptional => self.exceptional += 1,
            Rating::Good => self.good += 1,
            Rating::Ok => self.ok += 1,
            Rating::Failed => self.failed += 1,
        }
    }
}

/// Summary of an account's recent performance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PulseReport {
    pub username: String,
    pub sampled: usize,
    pub total_impressions: u64,
    pub total_bookmarks: u64,
    pub total_engagements: u64,
    /// Mean of per-tweet bookmark rates
    pub avg_bookmark_rate: f64,
    /// Total bookmarks over total impressions; drives `rating`
    pub overall_bookmark_rate: f64,
    pub rating: Rating,
    pub ratings: RatingCounts,
    pub best: Option<TweetMetrics>,
}

/// Pulse check over a sample of recent tweets
pub fn pulse_check(username: &str, tweets: &[Tweet]) -> PulseReport {
    let measured: Vec<TweetMetrics> = tweets.iter().map(measure).collect();

    let mut ratings = RatingCounts::default();
    for m in &measured {
        ratings.record(m.rating);
    }

    let total_impressions: u64 = measured.iter().map(|m| m.impressions).sum();
    let total_bookmarks: u64 = measured.iter().map(|m| m.bookmarks).sum();
    let total_engagements: u64 = tweets.iter().map(|t| t.metrics.engagements()).sum();

    let avg_bookmark_rate = if measured.is_empty() {
        0.0
    } else {
        measured.iter().map(|m| m.bookmark_rate).sum::<f64>() / measured.len() as f64
    };
    let overall_bookmark_rate = bookmark_rate(total_bookmarks, total_impressions);

    let best = measured.iter().fold(None::<&TweetMetrics>, |best, m| match best {
        Some(b) if b.bookmark_rate >= m.bookmark_rate => Some(b),
        _ => Some(m),
    });

    PulseReport {
        username: username.to_string(),
        sampled: measured.len(),
        total_impressions,
        total_bookmarks,
        total_engagements,
        avg_bookmark_rate,
        overall_bookmark_rate,
        rating: Rating::from_rate(overall_bookmark_rate),
        ratings,
        best: best.cloned(),
    }
}
