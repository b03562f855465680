//! Background task driving durable-store writes and stats publication.
//!
//! Mutations only raise the dirty flag. This task decides when a write
//! actually happens: immediately if the throttle window has passed, at the end
//! of the window otherwise, and on every periodic flush tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at, sleep_until};
use tracing::{debug, trace};

use super::cache_core::{CacheCore, wait_disposed};

pub(crate) struct PersistenceScheduler {
    throttle: Duration,
    flush_interval: Duration,
    stats_interval: Duration,
}

impl PersistenceScheduler {
    pub(crate) fn new(throttle: Duration, flush_interval: Duration, stats_interval: Duration) -> Self {
        Self {
            throttle,
            flush_interval: flush_interval.max(Duration::from_millis(1)),
            stats_interval: stats_interval.max(Duration::from_millis(1)),
        }
    }

    pub(crate) fn spawn(
        self,
        core: Arc<CacheCore>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(core, shutdown))
    }

    async fn run(self, core: Arc<CacheCore>, shutdown: watch::Receiver<bool>) {
        let mut flush_ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats_ticker = interval(self.stats_interval);
        stats_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deferred = sleep_until(Instant::now());
        tokio::pin!(deferred);
        let mut deferred_armed = false;

        let stop = wait_disposed(shutdown);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                () = &mut stop => break,
                () = core.dirty_notified() => {
                    match core.throttle_remaining(self.throttle) {
                        None => {
                            core.flush().await;
                        }
                        Some(wait) if !deferred_armed => {
                            trace!(wait_ms = wait.as_millis(), "Cache write throttled, deferring");
                            deferred.as_mut().reset(Instant::now() + wait);
                            deferred_armed = true;
                        }
                        Some(_) => {}
                    }
                }
                () = &mut deferred, if deferred_armed => {
                    deferred_armed = false;
                    if core.is_dirty() {
                        core.flush().await;
                    }
                }
                _ = flush_ticker.tick() => {
                    if core.needs_periodic_flush() {
                        core.flush().await;
                    }
                }
                _ = stats_ticker.tick() => {
                    core.publish_stats();
                }
            }
        }

        core.publish_stats();
        debug!("Cache persistence scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ImageCacheSettings;
    use crate::domain::ports::mocks::{FakeImageSource, MockDurableStore};

    fn start(
        settings: ImageCacheSettings,
    ) -> (
        Arc<CacheCore>,
        Arc<MockDurableStore>,
        watch::Sender<bool>,
        JoinHandle<()>,
    ) {
        let store = Arc::new(MockDurableStore::new());
        let (tx, rx) = watch::channel(false);
        let scheduler = PersistenceScheduler::new(
            settings.persist_throttle,
            settings.flush_interval,
            settings.stats_interval,
        );
        let core = Arc::new(CacheCore::new(
            settings,
            Arc::new(FakeImageSource::new()),
            store.clone(),
            rx.clone(),
        ));
        let handle = scheduler.spawn(core.clone(), rx);
        (core, store, tx, handle)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_write_is_immediate_then_throttled() {
        let (core, store, _tx, _handle) = start(ImageCacheSettings::default());

        core.preload(Some("a")).await.unwrap();
        settle().await;
        assert_eq!(store.write_count(), 1);

        core.preload(Some("b")).await.unwrap();
        settle().await;
        assert_eq!(store.write_count(), 1);
        assert!(core.is_dirty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.write_count(), 2);
        assert!(!core.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_inside_window_coalesces_into_one_write() {
        let (core, store, _tx, _handle) = start(ImageCacheSettings::default());
        core.preload(Some("a")).await.unwrap();
        settle().await;

        for url in ["b", "c", "d", "e"] {
            core.preload(Some(url)).await.unwrap();
            settle().await;
        }
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_retries_failed_write() {
        let (core, store, _tx, _handle) = start(ImageCacheSettings::default());
        store.set_fail_writes(true);

        core.preload(Some("a")).await.unwrap();
        settle().await;
        assert!(core.is_dirty());

        store.set_fail_writes(false);
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(store.write_count() >= 1);
        assert!(!core.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_published_on_interval() {
        let (core, _store, _tx, _handle) = start(ImageCacheSettings::default());
        let rx = core.subscribe_stats();
        settle().await;

        core.preload(Some("a")).await.unwrap();
        settle().await;
        assert_eq!(rx.borrow().size, 0);
        assert_eq!(core.stats().size, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(rx.borrow().size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_shutdown() {
        let (_core, _store, tx, handle) = start(ImageCacheSettings::default());

        tx.send(true).unwrap();

        handle.await.unwrap();
    }
}
