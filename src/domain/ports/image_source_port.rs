//! Port for fetching and decoding images.

use async_trait::async_trait;

use crate::domain::entities::LoadedImage;
use crate::domain::errors::CacheResult;

/// Port for loading an image from wherever a URL points.
/// Implementations must be thread-safe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSourcePort: Send + Sync {
    /// Fetches and decodes the image at `url`.
    ///
    /// Failures are reported as `CacheError::LoadFailure` carrying `url`.
    async fn load(&self, url: &str) -> CacheResult<LoadedImage>;
}
