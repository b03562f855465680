//! Application layer with the image cache service.

/// Cache services.
pub mod services;

pub use services::{BatchMode, BatchReport, ImageCache, ImageCacheSettings};
