//! Application services.

mod cache_core;
pub mod image_cache;
mod persistence_scheduler;
pub mod settings;

pub use image_cache::{BatchMode, BatchReport, ImageCache};
pub use settings::{DEFAULT_CAPACITY, DEFAULT_STORAGE_KEY, ImageCacheSettings};
