use std::time::Duration;

/// Namespaced key the cache record is persisted under.
pub const DEFAULT_STORAGE_KEY: &str = "astro-anomaly:image-cache";

/// Default maximum number of cached images.
pub const DEFAULT_CAPACITY: usize = 25;

/// Runtime settings for an `ImageCache`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCacheSettings {
    /// Maximum number of entries held in memory.
    pub capacity: usize,
    /// Durable store key holding the persisted record.
    pub storage_key: String,
    /// Minimum spacing between two durable-store writes.
    pub persist_throttle: Duration,
    /// Period of the background flush.
    pub flush_interval: Duration,
    /// Period of the published statistics refresh.
    pub stats_interval: Duration,
    /// Upper bound on a single image load, `None` for no limit.
    pub load_timeout: Option<Duration>,
    /// Share one in-flight load between concurrent misses of the same URL.
    pub coalesce_in_flight: bool,
}

impl Default for ImageCacheSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            persist_throttle: Duration::from_secs(10),
            flush_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(5),
            load_timeout: Some(Duration::from_secs(30)),
            coalesce_in_flight: false,
        }
    }
}
