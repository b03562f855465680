//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::application::services::{DEFAULT_CAPACITY, DEFAULT_STORAGE_KEY, ImageCacheSettings};
use crate::infrastructure::image::HttpSourceConfig;

use super::args::CliArgs;

const APP_NAME: &str = "anomaly-cache";
const APP_QUALIFIER: &str = "org";
const APP_ORGANIZATION: &str = "astro-anomaly";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, loaded from TOML and overridden by CLI flags.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory of the durable store. Platform cache dir if unset.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,

    /// Keep cache metadata in memory instead of the durable store.
    #[serde(skip)]
    pub ephemeral: bool,

    /// Image cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// HTTP image source configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Image cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached images.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Key of the persisted record in the durable store.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Minimum seconds between two durable-store writes.
    #[serde(default = "default_persist_throttle")]
    pub persist_throttle_secs: u64,

    /// Seconds between background flushes.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,

    /// Seconds between statistics refreshes.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Per-image load timeout in seconds, 0 to disable.
    #[serde(default = "default_timeout")]
    pub load_timeout_secs: u64,

    /// Share one load between concurrent requests for the same URL.
    #[serde(default)]
    pub coalesce_in_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            storage_key: default_storage_key(),
            persist_throttle_secs: default_persist_throttle(),
            flush_interval_secs: default_flush_interval(),
            stats_interval_secs: default_stats_interval(),
            load_timeout_secs: default_timeout(),
            coalesce_in_flight: false,
        }
    }
}

impl CacheConfig {
    /// Converts to runtime cache settings.
    #[must_use]
    pub fn to_settings(&self) -> ImageCacheSettings {
        ImageCacheSettings {
            capacity: self.capacity.max(1),
            storage_key: self.storage_key.clone(),
            persist_throttle: Duration::from_secs(self.persist_throttle_secs),
            flush_interval: Duration::from_secs(self.flush_interval_secs.max(1)),
            stats_interval: Duration::from_secs(self.stats_interval_secs.max(1)),
            load_timeout: (self.load_timeout_secs > 0)
                .then(|| Duration::from_secs(self.load_timeout_secs)),
            coalesce_in_flight: self.coalesce_in_flight,
        }
    }
}

/// HTTP image source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL relative image paths are resolved against.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// User agent header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    /// Converts to the HTTP source configuration. An unparseable base URL is
    /// ignored with a warning.
    #[must_use]
    pub fn to_source_config(&self) -> HttpSourceConfig {
        let base_url = self
            .base_url
            .as_deref()
            .and_then(|raw| match Url::parse(raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(base_url = raw, error = %e, "Ignoring invalid base url");
                    None
                }
            });

        HttpSourceConfig {
            base_url,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            user_agent: self.user_agent.clone(),
        }
    }
}

const fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

const fn default_persist_throttle() -> u64 {
    10
}

const fn default_flush_interval() -> u64 {
    30
}

const fn default_stats_interval() -> u64 {
    5
}

const fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(store_dir) = &args.store_dir {
            self.store_dir = Some(store_dir.clone());
        }
        if let Some(capacity) = args.capacity {
            self.cache.capacity = capacity;
        }
        if let Some(base_url) = &args.base_url {
            self.http.base_url = Some(base_url.clone());
        }
        if args.coalesce {
            self.cache.coalesce_in_flight = true;
        }
        if args.ephemeral {
            self.ephemeral = true;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("anomaly-cache.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
