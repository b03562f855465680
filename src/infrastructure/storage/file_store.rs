//! File-backed durable store: one JSON file per key.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, trace};

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::DurableStorePort;

const APP_QUALIFIER: &str = "org";
const APP_ORGANIZATION: &str = "astro-anomaly";
const APP_NAME: &str = "anomaly-cache";

/// Durable store keeping each key in its own file under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Creates a store in the platform cache directory
    /// (e.g. `~/.cache/anomaly-cache/store/`).
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(default_store_dir())
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path backing `key`.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        self.dir.join(format!("{}.json", hex::encode(&digest[..16])))
    }
}

fn write_atomic(path: &Path, value: &str) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("Invalid path"))?;
    std::fs::create_dir_all(parent)?;
    let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
    temp_file.write_all(value.as_bytes())?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl DurableStorePort for FileStore {
    async fn read(&self, key: &str) -> CacheResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                trace!(key, path = %path.display(), "Read durable store entry");
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::persistence(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write(&self, key: &str, value: &str) -> CacheResult<()> {
        let path = self.path_for(key);
        let value = value.to_string();
        let target = path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&target, &value))
            .await
            .map_err(|e| CacheError::persistence(format!("Write task panicked: {e}")))?
            .map_err(|e| {
                CacheError::persistence(format!("Failed to write {}: {e}", path.display()))
            })?;

        debug!(key, path = %path.display(), "Wrote durable store entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, path = %path.display(), "Removed durable store entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::persistence(format!(
                "Failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Returns the default store directory path.
fn default_store_dir() -> PathBuf {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
        || std::env::temp_dir().join(APP_NAME).join("store"),
        |dirs| dirs.cache_dir().join("store"),
    )
}
