//! Domain entity definitions.

mod cache_entry;
mod cache_key;
mod loaded_image;

pub use cache_entry::{
    CACHE_SCHEMA_VERSION, CacheEntry, CacheStats, PersistedCacheRecord, PersistedEntry,
};
pub use cache_key::CacheKey;
pub use loaded_image::LoadedImage;
