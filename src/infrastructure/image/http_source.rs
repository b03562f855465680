//! HTTP image source: download, then decode off the async runtime.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};
use url::Url;

use crate::domain::entities::LoadedImage;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::ImageSourcePort;

/// Configuration for the HTTP image source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Base URL that relative image paths are resolved against.
    pub base_url: Option<Url>,
    /// Request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

/// Loads images over HTTP(S) with reqwest.
pub struct HttpImageSource {
    http_client: reqwest::Client,
    base_url: Option<Url>,
}

impl std::fmt::Debug for HttpImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpImageSource")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl HttpImageSource {
    /// Creates a source with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: HttpSourceConfig) -> CacheResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| CacheError::load_failure("", format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url,
        })
    }

    /// Resolves `url` to an absolute http(s) URL.
    fn resolve(&self, url: &str) -> CacheResult<Url> {
        let resolved = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = &self.base_url else {
                    return Err(CacheError::load_failure(
                        url,
                        "relative url and no base url configured",
                    ));
                };
                base.join(url)
                    .map_err(|e| CacheError::load_failure(url, format!("invalid url: {e}")))?
            }
            Err(e) => return Err(CacheError::load_failure(url, format!("invalid url: {e}"))),
        };

        match resolved.scheme() {
            "http" | "https" => Ok(resolved),
            other => Err(CacheError::load_failure(
                url,
                format!("unsupported scheme: {other}"),
            )),
        }
    }

    /// Downloads image bytes.
    async fn download(&self, url: &str, target: Url) -> CacheResult<Bytes> {
        let response = self
            .http_client
            .get(target)
            .send()
            .await
            .map_err(|e| CacheError::load_failure(url, format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::load_failure(
                url,
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        if let Some(ctype) = content_type.as_deref()
            && !ctype.starts_with("image/")
            && !ctype.starts_with("application/octet-stream")
        {
            return Err(CacheError::load_failure(
                url,
                format!("unexpected content type: {ctype}"),
            ));
        }

        response
            .bytes()
            .await
            .map_err(|e| CacheError::load_failure(url, format!("Failed to read body: {e}")))
    }
}

/// Decodes an encoded image on the blocking pool.
pub(crate) async fn decode_bytes(url: &str, bytes: Bytes) -> CacheResult<LoadedImage> {
    let encoded_len = bytes.len();
    let decoded = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| CacheError::load_failure(url, format!("Decode task panicked: {e}")))?
        .map_err(|e| CacheError::load_failure(url, format!("Failed to decode image: {e}")))?;

    Ok(LoadedImage::new(url, decoded, encoded_len))
}

#[async_trait]
impl ImageSourcePort for HttpImageSource {
    async fn load(&self, url: &str) -> CacheResult<LoadedImage> {
        let target = self.resolve(url)?;
        trace!(url, target = %target, "Downloading image");

        let bytes = self.download(url, target).await?;
        let image = decode_bytes(url, bytes).await?;

        debug!(
            url,
            width = image.width(),
            height = image.height(),
            bytes = image.encoded_len,
            "Image loaded"
        );
        Ok(image)
    }
}
