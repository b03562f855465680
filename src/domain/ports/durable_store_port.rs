//! Port for the durable key/value store backing cache persistence.

use async_trait::async_trait;

use crate::domain::errors::CacheResult;

/// Port for a small client-side key/value store that survives restarts.
///
/// Values are opaque strings. Errors are reported as `CacheError::Persistence`.
#[async_trait]
pub trait DurableStorePort: Send + Sync {
    /// Reads the value stored under `key`.
    async fn read(&self, key: &str) -> CacheResult<Option<String>>;

    /// Replaces the value stored under `key`.
    async fn write(&self, key: &str, value: &str) -> CacheResult<()>;

    /// Erases `key`. Erasing an absent key succeeds.
    async fn remove(&self, key: &str) -> CacheResult<()>;
}
