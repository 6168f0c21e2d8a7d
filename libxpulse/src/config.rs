//! Configuration management for xpulse
//!
//! Non-secret settings come from an optional TOML file; credentials come
//! only from the environment (optionally seeded from a `.env` file).

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::rate_limit::RetryConfig;

/// User-context OAuth 2.0 token; required for writes
pub const ENV_ACCESS_TOKEN: &str = "X_ACCESS_TOKEN";
/// App-only bearer token; read-only access
pub const ENV_BEARER_TOKEN: &str = "X_BEARER_TOKEN";
pub const ENV_API_BASE_URL: &str = "X_API_BASE_URL";
pub const ENV_SCHEDULER_URL: &str = "XPULSE_SCHEDULER_URL";
pub const ENV_SCHEDULER_API_KEY: &str = "XPULSE_SCHEDULER_API_KEY";
pub const ENV_MAX_RETRIES: &str = "XPULSE_MAX_RETRIES";
pub const ENV_BASE_DELAY_MS: &str = "XPULSE_BASE_DELAY_MS";
pub const ENV_CONFIG: &str = "XPULSE_CONFIG";

pub const DEFAULT_API_BASE_URL: &str = "https://api.x.com/2";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub scheduler: SchedulerConfig,
    pub rate_limit: RateLimitConfig,
    pub thread: ThreadConfig,

    /// Resolved from the environment, never from the file
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub url: Option<String>,

    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub prewait_buffer_ms: u64,
    pub hint_buffer_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            prewait_buffer_ms: defaults.prewait_buffer.as_millis() as u64,
            hint_buffer_ms: defaults.hint_buffer.as_millis() as u64,
        }
    }
}

impl RateLimitConfig {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            prewait_buffer: Duration::from_millis(self.prewait_buffer_ms),
            hint_buffer: Duration::from_millis(self.hint_buffer_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Pause between consecutive posts of a thread
    pub delay_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self { delay_ms: 1_000 }
    }
}

/// Which kind of token authenticates API calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// OAuth 2.0 user-context token: reads and writes
    User,
    /// App-only bearer token: reads only
    AppOnly,
}

#[derive(Debug, Clone)]
pub enum Credentials {
    User { access_token: SecretString },
    AppOnly { bearer_token: SecretString },
}

impl Credentials {
    /// Pick credentials from the environment, preferring user context.
    pub fn from_env() -> Option<Self> {
        if let Some(token) = non_empty_env(ENV_ACCESS_TOKEN) {
            return Some(Credentials::User {
                access_token: SecretString::from(token),
            });
        }
        non_empty_env(ENV_BEARER_TOKEN).map(|token| Credentials::AppOnly {
            bearer_token: SecretString::from(token),
        })
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            Credentials::User { .. } => AuthMode::User,
            Credentials::AppOnly { .. } => AuthMode::AppOnly,
        }
    }

    pub fn token(&self) -> &SecretString {
        match self {
            Credentials::User { access_token } => access_token,
            Credentials::AppOnly { bearer_token } => bearer_token,
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the config file (if any) and the environment
    pub fn load() -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let path = resolve_config_path()?;
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Load the file part of the configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables on top of the file configuration
    pub fn apply_env(&mut self) -> Result<()> {
        self.credentials = Credentials::from_env();

        if let Some(url) = non_empty_env(ENV_API_BASE_URL) {
            self.api.base_url = url;
        }
        if let Some(url) = non_empty_env(ENV_SCHEDULER_URL) {
            self.scheduler.url = Some(url);
        }
        if let Some(key) = non_empty_env(ENV_SCHEDULER_API_KEY) {
            self.scheduler.api_key = Some(SecretString::from(key));
        }
        if let Some(value) = non_empty_env(ENV_MAX_RETRIES) {
            self.rate_limit.max_retries = parse_env(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = non_empty_env(ENV_BASE_DELAY_MS) {
            self.rate_limit.base_delay_ms = parse_env(ENV_BASE_DELAY_MS, &value)?;
        }

        self.validate()
    }

    /// Credentials for the X API, failing fast when none are configured
    pub fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            ConfigError::MissingCredential(format!(
                "set {} (user context) or {} (app-only)",
                ENV_ACCESS_TOKEN, ENV_BEARER_TOKEN
            ))
            .into()
        })
    }

    /// Scheduler URL and API key, failing fast when either is missing
    pub fn require_scheduler(&self) -> Result<(&str, &str)> {
        let url = self
            .scheduler
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField(ENV_SCHEDULER_URL.to_string()))?;
        let key = self
            .scheduler
            .api_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingCredential(ENV_SCHEDULER_API_KEY.to_string()))?;
        Ok((url, key.expose_secret()))
    }

    fn validate(&self) -> Result<()> {
        if self.rate_limit.base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rate_limit.base_delay_ms".to_string(),
                value: "0 (must be positive)".to_string(),
            }
            .into());
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("api.base_url".to_string()).into());
        }
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("xpulse").join("config.toml"))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}
