//! Logging setup shared by the library and the `xpulse` binary
//!
//! All output goes to stderr so stdout stays clean for JSON results.
//!
//! Resolution order for each setting: explicit value (CLI flag), then
//! `XPULSE_LOG_FORMAT` / `XPULSE_LOG_LEVEL`, then the default (text, `warn`).
//! `RUST_LOG`, when set, replaces the level filter entirely.
//!
//! ```no_run
//! use libxpulse::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::from_env(Some(LogFormat::Json), false).init();
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const ENV_LOG_FORMAT: &str = "XPULSE_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "XPULSE_LOG_LEVEL";

const DEFAULT_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain single-line events
    #[default]
    Text,
    /// One JSON object per event
    Json,
    /// Multi-line, colored
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                other
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Build from the environment; `format` overrides `XPULSE_LOG_FORMAT`
    /// and `verbose` forces `debug`.
    pub fn from_env(format: Option<LogFormat>, verbose: bool) -> Self {
        let format = format
            .or_else(|| {
                std::env::var(ENV_LOG_FORMAT)
                    .ok()
                    .and_then(|value| value.parse().ok())
            })
            .unwrap_or_default();

        let level = if verbose {
            "debug".to_string()
        } else {
            std::env::var(ENV_LOG_LEVEL)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
        };

        Self::new(format, level)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber. A second call is a no-op.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        // try_init only fails when a subscriber is already installed
        let _ = match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => builder.pretty().with_target(true).try_init(),
            LogFormat::Text => builder
                .with_target(false)
                .with_ansi(false)
                .compact()
                .try_init(),
        };
    }
}
