//! Image cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Image cache error variants.
///
/// `Clone` so that a single failed load can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum CacheError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("failed to load image {url}: {reason}")]
    LoadFailure { url: String, reason: String },

    #[error("cache persistence failed: {reason}")]
    Persistence { reason: String },
}

impl CacheError {
    /// Creates invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates load failure error for the attempted URL.
    #[must_use]
    pub fn load_failure(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates persistence error.
    #[must_use]
    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }

    /// Returns the URL a load failure was attempted for.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::LoadFailure { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Reattributes a load failure to `url`. Other variants are unchanged.
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        match self {
            Self::LoadFailure { reason, .. } => Self::LoadFailure {
                url: url.into(),
                reason,
            },
            other => other,
        }
    }

    /// Returns whether the caller may retry the operation later.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::LoadFailure { .. } | Self::Persistence { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::persistence(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_failure_carries_url() {
        let err = CacheError::load_failure("https://example.org/a.png", "HTTP 404");
        assert_eq!(err.url(), Some("https://example.org/a.png"));
        assert!(err.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_with_url_only_touches_load_failures() {
        let err = CacheError::load_failure("https://example.org/a.png", "HTTP 404")
            .with_url("HTTPS://Example.ORG/a.png");
        assert_eq!(err.url(), Some("HTTPS://Example.ORG/a.png"));

        let err = CacheError::persistence("disk full").with_url("ignored");
        assert_eq!(err, CacheError::persistence("disk full"));
    }

    #[test]
    fn test_invalid_input_is_not_recoverable() {
        assert!(!CacheError::invalid_input("empty url").is_recoverable());
        assert!(CacheError::persistence("disk full").is_recoverable());
    }
}
