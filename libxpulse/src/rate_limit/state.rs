//! Per-endpoint rate-limit state
//!
//! Tracks a binary healthy/exhausted flag for each endpoint label. Exact
//! remaining-call counts are not tracked.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Current wall-clock time in milliseconds since the unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Last-known rate-limit state for one endpoint label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    /// Caller-chosen label (e.g. "search", "post.create")
    pub endpoint: String,
    /// 0 when known exhausted, 1 when assumed available
    pub remaining: u32,
    /// Milliseconds since epoch after which the endpoint is assumed available; 0 when healthy
    pub reset_at: i64,
    /// Milliseconds since epoch of the most recent attempt
    pub last_hit: i64,
}

impl RateLimitState {
    pub fn healthy(endpoint: &str, now: i64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            remaining: 1,
            reset_at: 0,
            last_hit: now,
        }
    }

    pub fn exhausted(endpoint: &str, reset_at: i64, now: i64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            remaining: 0,
            reset_at,
            last_hit: now,
        }
    }

    /// Whether this state blocks calls at `now`
    pub fn is_limited_at(&self, now: i64) -> bool {
        self.remaining == 0 && self.reset_at > now
    }
}

/// In-memory store of rate-limit state keyed by endpoint label
///
/// Entries live for the lifetime of the store. The lock is only held for
/// the duration of a map operation, never across an await point.
#[derive(Debug, Default)]
pub struct RateLimitStore {
    states: Mutex<HashMap<String, RateLimitState>>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &str) -> Option<RateLimitState> {
        self.lock().get(endpoint).cloned()
    }

    /// Replace the state for `endpoint` (last write wins)
    pub fn set(&self, endpoint: &str, state: RateLimitState) {
        self.lock().insert(endpoint.to_string(), state);
    }

    /// True iff an entry exists, is exhausted, and its reset time is still ahead
    pub fn is_limited(&self, endpoint: &str) -> bool {
        self.get(endpoint)
            .map(|state| state.is_limited_at(now_millis()))
            .unwrap_or(false)
    }

    /// All known states, ordered by endpoint label
    pub fn snapshot(&self) -> Vec<RateLimitState> {
        let mut states: Vec<RateLimitState> = self.lock().values().cloned().collect();
        states.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        states
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateLimitState>> {
        // A panic while holding the lock cannot leave a half-written entry
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
