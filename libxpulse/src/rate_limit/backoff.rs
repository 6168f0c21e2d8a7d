//! Wait-duration policy for rate-limited retries

use std::time::Duration;

/// Compute how long to wait after a rate-limited attempt.
///
/// A positive server hint (seconds until reset) wins and gets `hint_buffer`
/// added on top. Otherwise the wait doubles per attempt starting from
/// `base_delay` at attempt index 0.
pub fn compute_wait(
    hint_secs: Option<f64>,
    attempt: u32,
    base_delay: Duration,
    hint_buffer: Duration,
) -> Duration {
    match hint_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .saturating_add(hint_buffer),
        _ => exponential(attempt, base_delay),
    }
}

/// `base_delay * 2^attempt`, saturating instead of overflowing
pub fn exponential(attempt: u32, base_delay: Duration) -> Duration {
    base_delay.saturating_mul(2u32.saturating_pow(attempt))
}
