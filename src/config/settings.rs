//! Application settings and Discord/Gemini configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Discord API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (obtain from the Discord developer portal).
    pub token: String,

    /// Guild to register slash commands in. Global registration when unset.
    #[serde(default)]
    pub guild_id: Option<u64>,
}

impl DiscordConfig {
    /// Creates a new Discord configuration.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self {
            token,
            guild_id: None,
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `DISCORD_BOT_TOKEN` to be set; `DISCORD_GUILD_ID` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Creates configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("DISCORD_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("DISCORD_BOT_TOKEN"))?;

        let guild_id = parse_optional(&lookup, "DISCORD_GUILD_ID")?;

        Ok(Self { token, guild_id })
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

/// Gemini API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// API key. Automatic mode is unavailable without it.
    pub api_key: Option<String>,

    /// Model name used for `generateContent`.
    #[serde(default = "default_model")]
    pub model: String,

    /// API root URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Total attempts per generation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum spacing between requests in seconds.
    #[serde(default = "default_min_request_interval")]
    pub min_request_interval_secs: u64,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_owned()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_owned()
}

const fn default_timeout() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_min_request_interval() -> u64 {
    2
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            min_request_interval_secs: default_min_request_interval(),
        }
    }
}

impl AiConfig {
    /// Creates AI settings from environment variables with defaults.
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Creates AI settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: lookup("GEMINI_MODEL").unwrap_or_else(default_model),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(default_base_url),
            timeout_secs: parse_optional(&lookup, "AI_TIMEOUT_SECS")?
                .unwrap_or_else(default_timeout),
            max_retries: parse_optional(&lookup, "AI_MAX_RETRIES")?
                .unwrap_or_else(default_max_retries)
                .max(1),
            min_request_interval_secs: parse_optional(&lookup, "AI_MIN_REQUEST_INTERVAL_SECS")?
                .unwrap_or_else(default_min_request_interval),
        })
    }

    /// Whether automatic (AI) mode can be used.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("min_request_interval_secs", &self.min_request_interval_secs)
            .finish()
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Path of the persisted schedule state.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Seconds to wait before retrying after a failed announcement.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Keep-alive server bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Keep-alive server bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level for the application.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("announcer_state.json")
}

const fn default_retry_backoff() -> u64 {
    60
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            retry_backoff_secs: default_retry_backoff(),
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// Creates bot settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            state_path: lookup("STATE_PATH").map_or_else(default_state_path, PathBuf::from),
            retry_backoff_secs: parse_optional(&lookup, "RETRY_BACKOFF_SECS")?
                .unwrap_or_else(default_retry_backoff),
            host: lookup("HOST").unwrap_or_else(default_host),
            port: parse_optional(&lookup, "PORT")?.unwrap_or_else(default_port),
            log_level: lookup("RUST_LOG").unwrap_or_else(default_log_level),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Parses an optional variable, treating blank values as unset.
fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        _ => Ok(None),
    }
}
