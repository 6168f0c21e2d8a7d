//! Rate-limit aware execution of remote calls
//!
//! Every remote call made through [`crate::client::XpulseClient`] runs inside
//! [`RateLimitedExecutor::execute_with`] under an endpoint label. The executor
//! remembers which labels were recently rejected with HTTP 429, waits out a
//! known-exhausted window before calling again, and retries rate-limit
//! rejections with backoff. All other failures pass straight through.
//!
//! # Examples
//!
//! ```no_run
//! use libxpulse::rate_limit::{RateLimitedExecutor, RetryConfig};
//! use libxpulse::error::XpulseError;
//!
//! # async fn example() -> libxpulse::Result<()> {
//! let executor = RateLimitedExecutor::new(RetryConfig::default());
//!
//! let count = executor
//!     .execute("search", || async { Ok::<_, XpulseError>(42) })
//!     .await?;
//!
//! assert_eq!(count, 42);
//! assert!(!executor.is_limited("search"));
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod classify;
pub mod executor;
pub mod state;

pub use backoff::compute_wait;
pub use classify::{extract_reset_hint_secs, is_rate_limited, RateLimitHint};
pub use executor::{RateLimitedExecutor, RetryConfig};
pub use state::{now_millis, RateLimitState, RateLimitStore};
