//! Error types for xpulse

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XpulseError>;

#[derive(Error, Debug)]
pub enum XpulseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Cancelled(#[from] Cancelled),
}

impl XpulseError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            XpulseError::InvalidInput(_) => 3,
            XpulseError::Config(_) => 2,
            XpulseError::Api(api) if api.is_authentication() => 2,
            XpulseError::Api(_) => 1,
            XpulseError::Scheduler(_) => 1,
            XpulseError::Cancelled(_) => 130,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Rate-limit metadata captured from a failed HTTP response.
///
/// `reset` is kept as the raw header text; interpretation happens in
/// [`crate::rate_limit::classify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<String>,
}

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Non-2xx response from the API. `message` always starts with
    /// `HTTP <status>` followed by the canonical reason phrase.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        rate_limit: Option<RateLimitHeaders>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    /// 2xx envelope that carried `errors` and no `data`
    #[error("API returned errors: {0}")]
    Problem(String),
}

impl ApiError {
    /// HTTP status code, when the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("{method} {path} failed with status {status}: {body}")]
    Http {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("{method} {path} request failed: {message}")]
    Transport {
        method: String,
        path: String,
        message: String,
    },

    #[error("{method} {path} returned an unreadable body: {message}")]
    Decode {
        method: String,
        path: String,
        message: String,
    },
}

/// The call was cancelled before it could be attempted, or while waiting
/// out a rate limit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Call to '{endpoint}' was cancelled")]
pub struct Cancelled {
    pub endpoint: String,
}
