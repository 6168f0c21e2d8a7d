//! Parsing of `--at` times for scheduled posts
//!
//! Accepted forms, tried in order:
//! - RFC 3339 timestamps: "2026-11-20T15:00:00Z"
//! - Relative durations: "90m", "2h 30m", "in 1 day"
//! - Natural language: "tomorrow 9am", "next friday 18:00"

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, XpulseError};

/// Resolve `input` against `now` into an absolute time in the future
pub fn parse_schedule_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(XpulseError::InvalidInput(
            "Schedule time cannot be empty".to_string(),
        ));
    }

    let at = match (parse_rfc3339(input), parse_relative(input)) {
        (Some(at), _) => at,
        (None, Some(offset)) => Duration::from_std(offset)
            .ok()
            .and_then(|offset| now.checked_add_signed(offset))
            .ok_or_else(|| {
                XpulseError::InvalidInput(format!(
                    "Schedule time is too far in the future: {}",
                    input
                ))
            })?,
        (None, None) => parse_natural_language(input, now).ok_or_else(|| {
            XpulseError::InvalidInput(format!("Could not parse schedule time: {}", input))
        })?,
    };

    if at <= now {
        return Err(XpulseError::InvalidInput(format!(
            "Schedule time {} is not in the future",
            at.to_rfc3339()
        )));
    }

    Ok(at)
}

fn parse_rfc3339(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn parse_relative(input: &str) -> Option<std::time::Duration> {
    let input = input.strip_prefix("in ").unwrap_or(input);
    humantime::parse_duration(input.trim()).ok()
}

fn parse_natural_language(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).ok()
}
