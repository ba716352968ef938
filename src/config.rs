//! Configuration module for feedrelay.

use serde::Deserialize;
use std::path::Path;

use crate::{RelayError, Result};

/// Feed parser configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Parse timeout in seconds.
    #[serde(default = "default_parse_timeout")]
    pub timeout_secs: u64,
    /// Maximum batch size that still runs the content-injection pass.
    #[serde(default = "default_max_injection_count")]
    pub max_injection_article_count: usize,
    /// Number of injection futures awaited concurrently per batch.
    #[serde(default = "default_injection_batch_size")]
    pub injection_batch_size: usize,
    /// Pause between injection batches, in milliseconds.
    #[serde(default = "default_injection_batch_pause")]
    pub injection_batch_pause_ms: u64,
}

fn default_parse_timeout() -> u64 {
    10
}

fn default_max_injection_count() -> usize {
    10
}

fn default_injection_batch_size() -> usize {
    25
}

fn default_injection_batch_pause() -> u64 {
    1000
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_parse_timeout(),
            max_injection_article_count: default_max_injection_count(),
            injection_batch_size: default_injection_batch_size(),
            injection_batch_pause_ms: default_injection_batch_pause(),
        }
    }
}

/// Article cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cached article sets, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub timeout_secs: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// User agent string for feed fetching.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    "feedrelay/1.0 (Feed Poller)".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/feedrelay.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Feed parser configuration.
    #[serde(default)]
    pub parser: ParserConfig,
    /// Article cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// HTTP fetcher configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }
}
