//! Decoded image resources.

use std::sync::Arc;

/// A decoded image as handed out by the cache.
///
/// Cloning is cheap; the pixel data is shared.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// URL the image was fetched from.
    pub url: String,
    /// Decoded pixels.
    pub image: Arc<image::DynamicImage>,
    /// Size of the encoded payload in bytes, 0 if unknown.
    pub encoded_len: usize,
}

impl LoadedImage {
    /// Wraps a decoded image.
    #[must_use]
    pub fn new(url: impl Into<String>, image: image::DynamicImage, encoded_len: usize) -> Self {
        Self {
            url: url.into(),
            image: Arc::new(image),
            encoded_len,
        }
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns true if both handles share the same pixel buffer.
    #[must_use]
    pub fn same_image(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}
