//! Rate-limit error classification
//!
//! Failures that know their HTTP status are classified by it: only a 429
//! response is a rate-limit rejection. Everything else falls back to the
//! rendered message, which counts as a rejection when it mentions `429` or
//! `Too Many Requests`. Structured errors never use the message fallback
//! because their text can echo server-side details, including numeric ids.
//!
//! Reset hints come from the [`RateLimitHint`] capability. Its precision is
//! bounded by the transport: [`crate::api::http::HttpXApi`] attaches the
//! `x-rate-limit-*` headers to every non-2xx response, but an [`crate::api::XApi`]
//! implementation that drops headers leaves the hint permanently absent, and
//! the executor then always falls back to exponential backoff.

use std::fmt;

use crate::error::{ApiError, XpulseError};

/// Capability for failures that can describe themselves as rate limits
pub trait RateLimitHint {
    /// Raw header value (unix seconds as text), if the failing call surfaced one
    fn rate_limit_reset(&self) -> Option<&str> {
        None
    }

    /// Definite classification, when the failure carries enough structure.
    ///
    /// `None` defers to the message-based check.
    fn rate_limit_verdict(&self) -> Option<bool> {
        None
    }
}

/// Plain messages carry no structure
impl RateLimitHint for str {}

impl RateLimitHint for ApiError {
    fn rate_limit_reset(&self) -> Option<&str> {
        match self {
            ApiError::Http {
                rate_limit: Some(headers),
                ..
            } => headers.reset.as_deref(),
            _ => None,
        }
    }

    fn rate_limit_verdict(&self) -> Option<bool> {
        match self {
            ApiError::Http { status, .. } => Some(*status == 429),
            ApiError::Problem(_) | ApiError::Decode(_) => Some(false),
            ApiError::Network(_) => None,
        }
    }
}

impl RateLimitHint for XpulseError {
    fn rate_limit_reset(&self) -> Option<&str> {
        match self {
            XpulseError::Api(api) => api.rate_limit_reset(),
            _ => None,
        }
    }

    fn rate_limit_verdict(&self) -> Option<bool> {
        match self {
            XpulseError::Api(api) => api.rate_limit_verdict(),
            _ => Some(false),
        }
    }
}

/// Whether `error` represents a rate-limit rejection
pub fn is_rate_limited<E: fmt::Display + RateLimitHint + ?Sized>(error: &E) -> bool {
    if let Some(verdict) = error.rate_limit_verdict() {
        return verdict;
    }
    let message = error.to_string();
    message.contains("429") || message.contains("Too Many Requests")
}

/// Seconds until the server says the limit resets, never negative.
///
/// Returns `None` when no reset header is attached or it is not an integer.
pub fn extract_reset_hint_secs<E: RateLimitHint + ?Sized>(error: &E, now_ms: i64) -> Option<f64> {
    let raw = error.rate_limit_reset()?;
    let reset_secs: i64 = raw.trim().parse().ok()?;
    let reset_ms = reset_secs.checked_mul(1000)?;
    let remaining_ms = reset_ms.saturating_sub(now_ms);
    Some((remaining_ms as f64 / 1000.0).max(0.0))
}
