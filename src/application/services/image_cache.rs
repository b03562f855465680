//! Size-bounded LRU image cache with best-effort persistence.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::entities::{CacheStats, LoadedImage};
use crate::domain::errors::CacheResult;
use crate::domain::ports::{DurableStorePort, ImageSourcePort};

use super::cache_core::CacheCore;
use super::persistence_scheduler::PersistenceScheduler;
use super::settings::ImageCacheSettings;

/// How `preload_many` issues its loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// All loads at once; waits for every one to settle.
    #[default]
    Parallel,
    /// One at a time, in input order.
    Sequential,
}

/// Outcome of a `preload_many` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of URLs now available from the cache.
    pub loaded: usize,
    /// URLs whose load failed.
    pub failed: Vec<String>,
    /// Number of empty entries filtered out before loading.
    pub skipped: usize,
}

/// Handle to a running image cache.
///
/// Owns the background persistence task. Call [`ImageCache::dispose`] to stop
/// it and flush pending metadata; dropping the handle stops it without a
/// final flush.
pub struct ImageCache {
    core: Arc<CacheCore>,
    shutdown_tx: watch::Sender<bool>,
    scheduler: Option<JoinHandle<()>>,
    restore: tokio::sync::Mutex<Option<JoinHandle<usize>>>,
    restored: std::sync::atomic::AtomicUsize,
    persisted: Vec<String>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("settings", self.core.settings())
            .field("stats", &self.core.stats())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Starts a cache: reads the persisted record, begins re-fetching its most
    /// recent entries in the background and starts the persistence scheduler.
    ///
    /// Persistence problems are logged; this never fails.
    pub async fn create(
        settings: ImageCacheSettings,
        source: Arc<dyn ImageSourcePort>,
        store: Arc<dyn DurableStorePort>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = PersistenceScheduler::new(
            settings.persist_throttle,
            settings.flush_interval,
            settings.stats_interval,
        );
        let core = Arc::new(CacheCore::new(settings, source, store, shutdown_rx.clone()));

        let urls = core.read_persisted().await;
        if !urls.is_empty() {
            info!(count = urls.len(), "Restoring persisted image cache entries");
        }
        let persisted = urls.clone();
        let restore = tokio::spawn(Self::restore_entries(core.clone(), urls));

        let scheduler = scheduler.spawn(core.clone(), shutdown_rx);

        Self {
            core,
            shutdown_tx,
            scheduler: Some(scheduler),
            restore: tokio::sync::Mutex::new(Some(restore)),
            restored: std::sync::atomic::AtomicUsize::new(0),
            persisted,
        }
    }

    async fn restore_entries(core: Arc<CacheCore>, urls: Vec<String>) -> usize {
        let results = join_all(urls.iter().map(|url| core.restore(url))).await;
        let restored = results.into_iter().filter(|ok| *ok).count();
        debug!(restored, requested = urls.len(), "Image cache warm-up finished");
        restored
    }

    /// Waits for the warm-up started by [`ImageCache::create`] and returns how
    /// many persisted entries were reloaded.
    pub async fn wait_for_restore(&self) -> usize {
        use std::sync::atomic::Ordering;

        let mut restore = self.restore.lock().await;
        if let Some(handle) = restore.take() {
            match handle.await {
                Ok(count) => self.restored.store(count, Ordering::Relaxed),
                Err(e) => warn!(error = %e, "Image cache warm-up task failed"),
            }
        }
        self.restored.load(Ordering::Relaxed)
    }

    /// Returns the image for `url`, loading and caching it on a miss.
    ///
    /// # Errors
    /// `InvalidInput` for an empty or absent url, `LoadFailure` if the image
    /// could not be fetched or decoded. Nothing is cached on failure.
    pub async fn preload<'a>(&self, url: impl Into<Option<&'a str>>) -> CacheResult<LoadedImage> {
        self.core.preload(url.into()).await
    }

    /// Preloads several URLs. Individual failures never abort the batch.
    pub async fn preload_many<S: AsRef<str>>(&self, urls: &[S], mode: BatchMode) -> BatchReport {
        let (valid, skipped): (Vec<&str>, Vec<&str>) = urls
            .iter()
            .map(|u| u.as_ref())
            .partition(|url| !url.trim().is_empty());

        let mut report = BatchReport {
            skipped: skipped.len(),
            ..BatchReport::default()
        };

        match mode {
            BatchMode::Parallel => {
                let results = join_all(valid.iter().map(|url| self.core.preload(Some(*url)))).await;
                for (url, result) in valid.iter().zip(results) {
                    match result {
                        Ok(_) => report.loaded += 1,
                        Err(e) => {
                            debug!(url = *url, error = %e, "Batch preload entry failed");
                            report.failed.push((*url).to_string());
                        }
                    }
                }
            }
            BatchMode::Sequential => {
                for url in valid {
                    match self.core.preload(Some(url)).await {
                        Ok(_) => report.loaded += 1,
                        Err(e) => {
                            warn!(url, error = %e, "Preload failed, continuing with next image");
                            report.failed.push(url.to_string());
                        }
                    }
                }
            }
        }

        report
    }

    /// Returns true if `url` currently has a live entry. A hit counts as a use
    /// for LRU purposes but not as a cache hit.
    pub fn is_cached<'a>(&self, url: impl Into<Option<&'a str>>) -> bool {
        self.core.is_cached(url.into())
    }

    /// Removes the listed URLs. Absent URLs are ignored. Returns how many
    /// entries were removed.
    pub fn remove_many<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        self.core.remove_many(urls)
    }

    /// Drops every entry, erases the persisted record and resets statistics.
    pub async fn clear(&self) {
        self.core.clear().await;
    }

    /// Writes the persisted record now, ignoring the throttle.
    /// Returns false if the write failed; the failure is logged.
    pub async fn flush(&self) -> bool {
        self.core.flush().await
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.core.stats()
    }

    /// Statistics refreshed on the configured interval.
    #[must_use]
    pub fn subscribe_stats(&self) -> watch::Receiver<CacheStats> {
        self.core.subscribe_stats()
    }

    /// URLs the persisted record held at startup, most recent first. Some may
    /// have failed to reload and are then absent from [`ImageCache::cached_urls`].
    #[must_use]
    pub fn persisted_urls(&self) -> &[String] {
        &self.persisted
    }

    /// Cached URLs, most recently used first.
    #[must_use]
    pub fn cached_urls(&self) -> Vec<String> {
        self.core.cached_urls()
    }

    /// Number of cached images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached images.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.capacity()
    }

    /// Stops background work, cancels in-flight loads and flushes pending
    /// metadata once.
    pub async fn dispose(mut self) {
        self.shutdown_tx.send_replace(true);

        if let Some(scheduler) = self.scheduler.take()
            && let Err(e) = scheduler.await
        {
            warn!(error = %e, "Cache persistence scheduler failed");
        }
        self.wait_for_restore().await;

        if self.core.is_dirty() {
            self.core.flush().await;
        }
        info!(stats = %self.core.stats(), "Image cache disposed");
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
