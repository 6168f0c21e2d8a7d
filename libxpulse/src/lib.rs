//! xpulse - a rate-limit aware X client
//!
//! This library provides typed access to the X API v2 with per-endpoint
//! rate-limit tracking and retry, bookmark-rate metrics, and a client for an
//! external post-scheduling service.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod rate_limit;
pub mod schedule_time;
pub mod scheduler;
pub mod types;

// Re-export commonly used types
pub use client::XpulseClient;
pub use config::{AuthMode, Config, Credentials};
pub use error::{ApiError, Cancelled, ConfigError, Result, SchedulerError, XpulseError};
pub use metrics::{PulseReport, Rating, TweetMetrics};
pub use rate_limit::{RateLimitState, RateLimitStore, RateLimitedExecutor, RetryConfig};
pub use scheduler::{ScheduleRequest, ScheduledPost, ScheduledStatus, SchedulerClient};
pub use types::{PostedTweet, PublicMetrics, Tweet, User};
