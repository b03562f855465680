//! Cache entries, their persisted form and cache statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CacheKey, LoadedImage};

/// Schema tag of the persisted record understood by this build.
pub const CACHE_SCHEMA_VERSION: &str = "1.0";

/// One cached image.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Normalized URL.
    pub key: CacheKey,
    /// Decoded image.
    pub resource: LoadedImage,
    /// Milliseconds since the epoch of the last hit, membership check or insert.
    pub last_accessed_at: i64,
}

impl CacheEntry {
    /// Creates an entry accessed at `now`.
    #[must_use]
    pub const fn new(key: CacheKey, resource: LoadedImage, now: i64) -> Self {
        Self {
            key,
            resource,
            last_accessed_at: now,
        }
    }

    /// Marks the entry as used at `now`.
    pub fn touch(&mut self, now: i64) {
        self.last_accessed_at = self.last_accessed_at.max(now);
    }
}

/// Metadata kept for one URL in the durable store. No image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// URL to re-fetch on warm start.
    pub url: String,
    /// Last access time in milliseconds since the epoch.
    #[serde(rename = "lastAccessed")]
    pub last_accessed: i64,
    /// When this entry was written.
    pub timestamp: i64,
}

/// Durable representation of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCacheRecord {
    /// Schema tag. Records with any other value are discarded.
    pub version: String,
    /// URL to metadata.
    #[serde(default)]
    pub entries: BTreeMap<String, PersistedEntry>,
    /// Time of the write that produced this record.
    #[serde(default)]
    pub last_cleanup: i64,
}

impl PersistedCacheRecord {
    /// Builds a record from `(key, last_accessed)` pairs, keeping only the
    /// `limit` most recently accessed ones.
    #[must_use]
    pub fn from_access_times<I>(items: I, limit: usize, now: i64) -> Self
    where
        I: IntoIterator<Item = (CacheKey, i64)>,
    {
        let mut items: Vec<_> = items.into_iter().collect();
        items.sort_by(|a, b| b.1.cmp(&a.1));
        items.truncate(limit);

        let entries = items
            .into_iter()
            .map(|(key, last_accessed)| {
                let url = key.into_string();
                (
                    url.clone(),
                    PersistedEntry {
                        url,
                        last_accessed,
                        timestamp: now,
                    },
                )
            })
            .collect();

        Self {
            version: CACHE_SCHEMA_VERSION.to_string(),
            entries,
            last_cleanup: now,
        }
    }

    /// Returns true if the record was written by a compatible build.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.version == CACHE_SCHEMA_VERSION
    }

    /// Entries sorted by last access, newest first, at most `limit` of them.
    #[must_use]
    pub fn most_recent(&self, limit: usize) -> Vec<&PersistedEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        entries.truncate(limit);
        entries
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Current number of cached images.
    pub size: usize,
    /// Size in bytes of the last record written to the durable store.
    pub persisted_bytes: usize,
}

impl CacheStats {
    /// Hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {:.1}% hit rate ({} hits, {} misses), {} bytes persisted",
            self.size,
            self.hit_rate(),
            self.hits,
            self.misses,
            self.persisted_bytes
        )
    }
}
