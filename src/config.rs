//! Configuration file parser for ~/.config/feedpoll/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each one
//! since they are usually typos.
use crate::feed::FetcherConfig;
use crate::util::{parse_duration, DurationError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value for `{key}`: {source}")]
    InvalidDuration {
        key: &'static str,
        #[source]
        source: DurationError,
    },

    #[error("`fetch_interval` must be greater than zero")]
    ZeroInterval,

    #[error("`fetch_timeout_secs` must be greater than zero")]
    ZeroTimeout,
}

// ============================================================================
// Configuration Structs
// ============================================================================

const KNOWN_KEYS: [&str; 6] = [
    "database_path",
    "fetch_interval",
    "fetch_timeout_secs",
    "cache_ttl",
    "user_agent",
    "max_feed_bytes",
];

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Durations are kept as written and checked by [`Config::validate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. `None` means `feedpoll.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Period between polling cycles, e.g. `"1m"` or `"1h30m"`.
    pub fetch_interval: String,

    pub fetch_timeout_secs: u64,

    /// How long a fetched document is served from memory. `"0s"` disables.
    pub cache_ttl: String,

    pub user_agent: String,

    /// Responses larger than this are rejected.
    pub max_feed_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        let fetcher = FetcherConfig::default();
        Self {
            database_path: None,
            fetch_interval: "1m".to_string(),
            fetch_timeout_secs: fetcher.timeout.as_secs(),
            cache_ttl: "30s".to_string(),
            user_agent: fetcher.user_agent,
            max_feed_bytes: fetcher.max_body_bytes,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Bad duration, zero interval or zero timeout → `Err(ConfigError::InvalidDuration | ZeroInterval | ZeroTimeout)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            fetch_interval = %config.fetch_interval,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check the duration fields, which serde accepts as plain strings, and
    /// the fetch timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.fetch_interval()?;
        self.cache_ttl()?;
        Ok(())
    }

    /// Parsed `fetch_interval`; zero is rejected.
    pub fn fetch_interval(&self) -> Result<Duration, ConfigError> {
        let interval = parse_duration(&self.fetch_interval).map_err(|source| {
            ConfigError::InvalidDuration {
                key: "fetch_interval",
                source,
            }
        })?;
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(interval)
    }

    /// Parsed `cache_ttl`, or `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Result<Option<Duration>, ConfigError> {
        let ttl = parse_duration(&self.cache_ttl).map_err(|source| {
            ConfigError::InvalidDuration {
                key: "cache_ttl",
                source,
            }
        })?;
        Ok((!ttl.is_zero()).then_some(ttl))
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_body_bytes: self.max_feed_bytes,
        }
    }

    /// `database_path` if set, otherwise `feedpoll.db` inside `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feedpoll.db"))
    }
}

// ============================================================================
// Tests
// ============================================================================
