//! Shared state behind an `ImageCache` handle.
//!
//! Every mutation of the entry map, counters and dirty flag happens inside a
//! single `parking_lot` critical section, so the find-oldest, evict, insert
//! sequence cannot interleave with another load completing.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    CacheEntry, CacheKey, CacheStats, LoadedImage, PersistedCacheRecord,
};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{DurableStorePort, ImageSourcePort};

use super::settings::ImageCacheSettings;

type SharedLoad = Shared<BoxFuture<'static, CacheResult<LoadedImage>>>;

/// Millisecond timestamps that never repeat or go backwards.
#[derive(Debug, Default)]
struct AccessClock {
    last: i64,
}

impl AccessClock {
    fn tick(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last
    }
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    clock: AccessClock,
    hits: u64,
    misses: u64,
    persisted_bytes: usize,
    dirty: bool,
    last_write_attempt: Option<Instant>,
}

pub(crate) struct CacheCore {
    settings: ImageCacheSettings,
    source: Arc<dyn ImageSourcePort>,
    store: Arc<dyn DurableStorePort>,
    state: Mutex<CacheState>,
    in_flight: Mutex<HashMap<CacheKey, SharedLoad>>,
    write_lock: tokio::sync::Mutex<()>,
    dirty_notify: Notify,
    stats_tx: watch::Sender<CacheStats>,
    shutdown: watch::Receiver<bool>,
}

impl CacheCore {
    pub(crate) fn new(
        settings: ImageCacheSettings,
        source: Arc<dyn ImageSourcePort>,
        store: Arc<dyn DurableStorePort>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let cap = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);
        let (stats_tx, _) = watch::channel(CacheStats::default());
        Self {
            settings,
            source,
            store,
            state: Mutex::new(CacheState {
                entries: LruCache::new(cap),
                clock: AccessClock::default(),
                hits: 0,
                misses: 0,
                persisted_bytes: 0,
                dirty: false,
                last_write_attempt: None,
            }),
            in_flight: Mutex::new(HashMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
            dirty_notify: Notify::new(),
            stats_tx,
            shutdown,
        }
    }

    pub(crate) const fn settings(&self) -> &ImageCacheSettings {
        &self.settings
    }

    pub(crate) fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    /// Returns the cached image for `url`, loading it on a miss.
    pub(crate) async fn preload(self: &Arc<Self>, url: Option<&str>) -> CacheResult<LoadedImage> {
        let key = match url {
            Some(raw) if !raw.trim().is_empty() => CacheKey::normalize(raw),
            _ => return Err(CacheError::invalid_input("image url is empty")),
        };

        if let Some(image) = self.lookup(&key) {
            return Ok(image);
        }

        self.fetch(&key).await.map_err(|e| match url {
            Some(raw) => e.with_url(raw),
            None => e,
        })
    }

    /// Reloads an entry from the persisted record without touching counters.
    pub(crate) async fn restore(self: &Arc<Self>, url: &str) -> bool {
        let key = CacheKey::normalize(url);
        if self.state.lock().entries.contains(&key) {
            return true;
        }
        match self.fetch(&key).await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %key, error = %e, "Dropping persisted entry that failed to reload");
                false
            }
        }
    }

    pub(crate) fn is_cached(&self, url: Option<&str>) -> bool {
        let Some(raw) = url.filter(|u| !u.trim().is_empty()) else {
            debug!("Membership check with empty url");
            return false;
        };
        let key = CacheKey::normalize(raw);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = state.clock.tick();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.touch(now);
            true
        } else {
            false
        }
    }

    pub(crate) fn remove_many<S: AsRef<str>>(&self, urls: &[S]) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let removed = urls
                .iter()
                .map(|u| u.as_ref())
                .filter(|u| !u.trim().is_empty())
                .filter(|u| state.entries.pop(&CacheKey::normalize(u)).is_some())
                .count();
            state.dirty = true;
            removed
        };
        debug!(requested = urls.len(), removed, "Removed images from cache");
        self.dirty_notify.notify_one();
        removed
    }

    pub(crate) async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        {
            let mut state = self.state.lock();
            state.entries.clear();
            state.hits = 0;
            state.misses = 0;
            state.persisted_bytes = 0;
            state.dirty = false;
        }

        if let Err(e) = self.store.remove(&self.settings.storage_key).await {
            warn!(error = %e, "Failed to erase persisted image cache");
        }
        info!("Cleared image cache");
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            persisted_bytes: state.persisted_bytes,
        }
    }

    pub(crate) fn publish_stats(&self) {
        self.stats_tx.send_replace(self.stats());
    }

    pub(crate) fn subscribe_stats(&self) -> watch::Receiver<CacheStats> {
        self.stats_tx.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Cached keys, most recently used first.
    pub(crate) fn cached_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(key, _)| key.as_str().to_string())
            .collect()
    }

    pub(crate) fn last_accessed(&self, url: &str) -> Option<i64> {
        self.state
            .lock()
            .entries
            .peek(&CacheKey::normalize(url))
            .map(|entry| entry.last_accessed_at)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// True if the periodic flush has something worth writing.
    pub(crate) fn needs_periodic_flush(&self) -> bool {
        let state = self.state.lock();
        state.dirty || !state.entries.is_empty()
    }

    /// Time left in the write throttle window, `None` if a write may go now.
    pub(crate) fn throttle_remaining(&self, throttle: Duration) -> Option<Duration> {
        let last = self.state.lock().last_write_attempt?;
        throttle.checked_sub(last.elapsed()).filter(|d| !d.is_zero())
    }

    pub(crate) async fn dirty_notified(&self) {
        self.dirty_notify.notified().await;
    }

    /// Writes the persisted record now. Failures are logged and leave the
    /// dirty flag set for a later retry.
    pub(crate) async fn flush(&self) -> bool {
        let _guard = self.write_lock.lock().await;

        let record = {
            let mut state = self.state.lock();
            state.dirty = false;
            state.last_write_attempt = Some(Instant::now());
            PersistedCacheRecord::from_access_times(
                state
                    .entries
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.last_accessed_at)),
                state.entries.cap().get(),
                chrono::Utc::now().timestamp_millis(),
            )
        };

        match self.write_record(&record).await {
            Ok(bytes) => {
                self.state.lock().persisted_bytes = bytes;
                debug!(entries = record.entries.len(), bytes, "Persisted image cache");
                true
            }
            Err(e) => {
                self.state.lock().dirty = true;
                warn!(error = %e, "Failed to persist image cache");
                false
            }
        }
    }

    async fn write_record(&self, record: &PersistedCacheRecord) -> CacheResult<usize> {
        let payload = serde_json::to_string(record)?;
        self.store
            .write(&self.settings.storage_key, &payload)
            .await?;
        Ok(payload.len())
    }

    /// Reads the persisted record and returns the URLs worth restoring.
    /// Stale or unreadable records are erased.
    pub(crate) async fn read_persisted(&self) -> Vec<String> {
        let key = &self.settings.storage_key;
        let payload = match self.store.read(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted image cache");
                return Vec::new();
            }
        };

        let record = match serde_json::from_str::<PersistedCacheRecord>(&payload) {
            Ok(record) if record.is_current() => record,
            Ok(record) => {
                info!(version = %record.version, "Discarding persisted image cache with stale version");
                self.erase_persisted().await;
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable persisted image cache");
                self.erase_persisted().await;
                return Vec::new();
            }
        };

        self.state.lock().persisted_bytes = payload.len();

        record
            .most_recent(self.capacity())
            .into_iter()
            .map(|entry| entry.url.clone())
            .collect()
    }

    async fn erase_persisted(&self) {
        if let Err(e) = self.store.remove(&self.settings.storage_key).await {
            warn!(error = %e, "Failed to erase persisted image cache");
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<LoadedImage> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = state.clock.tick();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.touch(now);
            state.hits += 1;
            trace!(url = %key, "Image cache hit");
            Some(entry.resource.clone())
        } else {
            state.misses += 1;
            trace!(url = %key, "Image cache miss");
            None
        }
    }

    fn insert(&self, key: CacheKey, resource: LoadedImage) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let now = state.clock.tick();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.resource = resource;
                entry.touch(now);
            } else {
                if state.entries.len() >= state.entries.cap().get()
                    && let Some((evicted, entry)) = state.entries.pop_lru()
                {
                    debug!(
                        url = %evicted,
                        last_accessed = entry.last_accessed_at,
                        "Evicted least recently used image"
                    );
                }
                state
                    .entries
                    .put(key.clone(), CacheEntry::new(key.clone(), resource, now));
                debug!(url = %key, size = state.entries.len(), "Stored image in cache");
            }
            state.dirty = true;
        }
        self.dirty_notify.notify_one();
    }

    async fn fetch(self: &Arc<Self>, key: &CacheKey) -> CacheResult<LoadedImage> {
        if !self.settings.coalesce_in_flight {
            return self.load_and_insert(key).await;
        }

        let shared = {
            let mut in_flight = self.in_flight.lock();
            if let Some(pending) = in_flight.get(key) {
                trace!(url = %key, "Joining in-flight image load");
                pending.clone()
            } else {
                let core = Arc::clone(self);
                let owned = key.clone();
                let pending = async move {
                    let result = core.load_and_insert(&owned).await;
                    core.in_flight.lock().remove(&owned);
                    result
                }
                .boxed()
                .shared();
                in_flight.insert(key.clone(), pending.clone());
                pending
            }
        };

        shared.await
    }

    async fn load_and_insert(&self, key: &CacheKey) -> CacheResult<LoadedImage> {
        let result = self.load_guarded(key.as_str()).await;
        match &result {
            Ok(image) => self.insert(key.clone(), image.clone()),
            Err(e) => debug!(url = %key, error = %e, "Image load failed"),
        }
        result
    }

    /// Loads through the source, bounded by the timeout and by disposal.
    async fn load_guarded(&self, url: &str) -> CacheResult<LoadedImage> {
        let disposed = *self.shutdown.borrow();
        if disposed {
            return Err(CacheError::load_failure(url, "cache disposed"));
        }

        debug!(url, "Loading image");
        let load = async {
            match self.settings.load_timeout {
                Some(limit) => tokio::time::timeout(limit, self.source.load(url))
                    .await
                    .unwrap_or_else(|_| {
                        Err(CacheError::load_failure(
                            url,
                            format!("timed out after {}ms", limit.as_millis()),
                        ))
                    }),
                None => self.source.load(url).await,
            }
        };

        tokio::select! {
            result = load => result,
            () = wait_disposed(self.shutdown.clone()) => {
                Err(CacheError::load_failure(url, "cancelled: cache disposed"))
            }
        }
    }
}

/// Resolves once the shutdown flag is raised or its sender is gone.
pub(crate) async fn wait_disposed(mut shutdown: watch::Receiver<bool>) {
    loop {
        let disposed = *shutdown.borrow_and_update();
        if disposed || shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{FakeImageSource, MockDurableStore};

    fn core_with(
        capacity: usize,
        source: FakeImageSource,
    ) -> (Arc<CacheCore>, Arc<MockDurableStore>, watch::Sender<bool>) {
        let store = Arc::new(MockDurableStore::new());
        let (tx, rx) = watch::channel(false);
        let settings = ImageCacheSettings {
            capacity,
            ..ImageCacheSettings::default()
        };
        let core = Arc::new(CacheCore::new(
            settings,
            Arc::new(source),
            store.clone(),
            rx,
        ));
        (core, store, tx)
    }

    #[test]
    fn test_clock_is_strictly_increasing() {
        let mut clock = AccessClock::default();
        let first = clock.tick();
        let second = clock.tick();
        let third = clock.tick();
        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn test_hit_and_miss_counting() {
        let (core, _store, _tx) = core_with(3, FakeImageSource::new());

        core.preload(Some("a")).await.unwrap();
        core.preload(Some("a")).await.unwrap();

        let stats = core.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_insert_marks_dirty() {
        let (core, _store, _tx) = core_with(3, FakeImageSource::new());
        assert!(!core.is_dirty());

        core.preload(Some("a")).await.unwrap();

        assert!(core.is_dirty());
    }

    #[tokio::test]
    async fn test_eviction_picks_smallest_access_time() {
        let (core, _store, _tx) = core_with(3, FakeImageSource::new());
        for url in ["a", "b", "c"] {
            core.preload(Some(url)).await.unwrap();
        }
        assert!(core.is_cached(Some("a")));

        let oldest = ["a", "b", "c"]
            .into_iter()
            .min_by_key(|u| core.last_accessed(u).unwrap())
            .unwrap();
        assert_eq!(oldest, "b");

        core.preload(Some("d")).await.unwrap();

        assert!(!core.is_cached(Some("b")));
        assert_eq!(core.len(), 3);
    }

    #[tokio::test]
    async fn test_flush_writes_current_record() {
        let (core, store, _tx) = core_with(3, FakeImageSource::new());
        core.preload(Some("https://example.org/a.png")).await.unwrap();

        assert!(core.flush().await);

        let payload = store.value(&core.settings().storage_key).unwrap();
        let record: PersistedCacheRecord = serde_json::from_str(&payload).unwrap();
        assert!(record.entries.contains_key("https://example.org/a.png"));
        assert_eq!(core.stats().persisted_bytes, payload.len());
        assert!(!core.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_dirty() {
        let (core, store, _tx) = core_with(3, FakeImageSource::new());
        core.preload(Some("a")).await.unwrap();
        store.set_fail_writes(true);

        assert!(!core.flush().await);

        assert!(core.is_dirty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_erased() {
        let store = Arc::new(MockDurableStore::with_value(
            "astro-anomaly:image-cache",
            "{not json",
        ));
        let (_tx, rx) = watch::channel(false);
        let core = CacheCore::new(
            ImageCacheSettings::default(),
            Arc::new(FakeImageSource::new()),
            store.clone(),
            rx,
        );

        assert!(core.read_persisted().await.is_empty());
        assert!(store.value("astro-anomaly:image-cache").is_none());
    }

    #[tokio::test]
    async fn test_throttle_window() {
        let (core, _store, _tx) = core_with(3, FakeImageSource::new());
        assert!(core.throttle_remaining(Duration::from_secs(10)).is_none());

        core.flush().await;

        assert!(core.throttle_remaining(Duration::from_secs(10)).is_some());
        assert!(core.throttle_remaining(Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn test_disposed_core_refuses_loads() {
        let (core, _store, tx) = core_with(3, FakeImageSource::new());
        tx.send(true).unwrap();

        let err = core.preload(Some("a")).await.unwrap_err();

        assert!(matches!(err, CacheError::LoadFailure { .. }));
        assert_eq!(core.len(), 0);
    }

    #[tokio::test]
    async fn test_clear_waits_for_running_flush() {
        let (core, store, _tx) = core_with(3, FakeImageSource::new());
        store.set_write_delay(Duration::from_millis(100));
        core.preload(Some("a")).await.unwrap();

        let flushing = tokio::spawn({
            let core = core.clone();
            async move { core.flush().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        core.clear().await;

        assert!(flushing.await.unwrap());
        assert_eq!(core.stats(), CacheStats::default());
        assert!(!core.is_dirty());
        assert!(store.value("astro-anomaly:image-cache").is_none());
    }

    #[tokio::test]
    async fn test_clear_after_failed_flush_stays_clean() {
        let (core, store, _tx) = core_with(3, FakeImageSource::new());
        store.set_write_delay(Duration::from_millis(100));
        store.set_fail_writes(true);
        core.preload(Some("a")).await.unwrap();

        let flushing = tokio::spawn({
            let core = core.clone();
            async move { core.flush().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        core.clear().await;

        assert!(!flushing.await.unwrap());
        assert!(!core.is_dirty());
        assert_eq!(core.len(), 0);
    }
}
