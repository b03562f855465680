//! Process-local durable store. Nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::errors::CacheResult;
use crate::domain::ports::DurableStorePort;

/// Store backed by a map, for ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStorePort for MemoryStore {
    async fn read(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> CacheResult<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
