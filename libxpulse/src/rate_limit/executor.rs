//! Rate-limit aware call execution
//!
//! Wraps a single logical remote call with pre-wait, bounded retry on
//! rate-limit rejections, and per-endpoint state updates.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backoff::compute_wait;
use super::classify::{extract_reset_hint_secs, is_rate_limited, RateLimitHint};
use super::state::{now_millis, RateLimitState, RateLimitStore};
use crate::error::Cancelled;

/// Retry and wait tuning for [`RateLimitedExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,
    /// Wait after the first rate-limited attempt when no hint is available
    pub base_delay: Duration,
    /// Added to the remaining reset time before calling a known-exhausted endpoint
    pub prewait_buffer: Duration,
    /// Added to a server-supplied reset hint
    pub hint_buffer: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(15_000),
            prewait_buffer: Duration::from_millis(500),
            hint_buffer: Duration::from_millis(1_000),
        }
    }
}

/// Executes remote calls with per-endpoint rate-limit tracking
///
/// The store is owned by the executor; independent executors never share
/// state unless built from the same store with [`RateLimitedExecutor::with_store`].
#[derive(Debug, Clone)]
pub struct RateLimitedExecutor {
    store: Arc<RateLimitStore>,
    config: RetryConfig,
}

impl RateLimitedExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_store(Arc::new(RateLimitStore::new()), config)
    }

    pub fn with_store(store: Arc<RateLimitStore>, config: RetryConfig) -> Self {
        Self { store, config }
    }

    /// Process-wide executor with default settings
    pub fn global() -> &'static RateLimitedExecutor {
        static GLOBAL: OnceLock<RateLimitedExecutor> = OnceLock::new();
        GLOBAL.get_or_init(|| RateLimitedExecutor::new(RetryConfig::default()))
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn store(&self) -> &RateLimitStore {
        &self.store
    }

    pub fn state(&self, endpoint: &str) -> Option<RateLimitState> {
        self.store.get(endpoint)
    }

    pub fn is_limited(&self, endpoint: &str) -> bool {
        self.store.is_limited(endpoint)
    }

    /// Run `op` under this executor's configuration with uncancellable waits
    pub async fn execute<T, E, F, Fut>(&self, endpoint: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + RateLimitHint + From<Cancelled>,
    {
        let config = self.config.clone();
        self.execute_with(endpoint, &config, None, op).await
    }

    /// Run `op` against `endpoint`, retrying rate-limit rejections.
    ///
    /// `op` is invoked at least once and at most `config.max_retries + 1`
    /// times. Failures that are not rate limits are returned unchanged after
    /// a single attempt and leave the stored state untouched. When retries
    /// run out, the last failure is returned unchanged.
    ///
    /// If `cancel` fires during a pre-wait or a backoff wait, the call stops
    /// and `E::from(Cancelled)` is returned.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        endpoint: &str,
        config: &RetryConfig,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + RateLimitHint + From<Cancelled>,
    {
        if let Some(state) = self.store.get(endpoint) {
            let now = now_millis();
            if state.is_limited_at(now) {
                let wait = millis_to_duration(state.reset_at - now).saturating_add(config.prewait_buffer);
                warn!(
                    endpoint,
                    wait_secs = wait.as_secs_f64(),
                    "{} is rate limited, waiting {:.1}s before calling",
                    endpoint,
                    wait.as_secs_f64()
                );
                pause(endpoint, wait, cancel).await.map_err(E::from)?;
            }
        }

        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(endpoint, attempt = attempt + 1, "Call succeeded after retry");
                    }
                    self.store
                        .set(endpoint, RateLimitState::healthy(endpoint, now_millis()));
                    return Ok(value);
                }
                Err(error) => {
                    if !is_rate_limited(&error) {
                        return Err(error);
                    }

                    let now = now_millis();
                    let hint = extract_reset_hint_secs(&error, now);
                    let wait = compute_wait(hint, attempt, config.base_delay, config.hint_buffer);
                    let reset_at = now.saturating_add(duration_to_millis(wait).max(1));
                    self.store
                        .set(endpoint, RateLimitState::exhausted(endpoint, reset_at, now));

                    if attempt >= config.max_retries {
                        warn!(
                            endpoint,
                            attempts = attempt + 1,
                            "Rate limit on {} persisted after {} attempt(s): {}",
                            endpoint,
                            attempt + 1,
                            error
                        );
                        return Err(error);
                    }

                    warn!(
                        endpoint,
                        retry = attempt + 1,
                        max_retries = config.max_retries,
                        wait_secs = wait.as_secs_f64(),
                        hinted = hint.is_some(),
                        "Rate limited on {} (retry {}/{}), waiting {:.1}s",
                        endpoint,
                        attempt + 1,
                        config.max_retries,
                        wait.as_secs_f64()
                    );
                    pause(endpoint, wait, cancel).await.map_err(E::from)?;
                    attempt += 1;
                }
            }
        }
    }
}

async fn pause(
    endpoint: &str,
    wait: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), Cancelled> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Cancelled {
                    endpoint: endpoint.to_string(),
                }),
                _ = sleep(wait) => Ok(()),
            }
        }
        None => {
            sleep(wait).await;
            Ok(())
        }
    }
}

fn millis_to_duration(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

fn duration_to_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
