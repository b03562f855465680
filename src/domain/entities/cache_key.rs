//! Cache identity for image URLs.

use url::Url;

/// Normalized image URL used as the cache key.
///
/// Absolute URLs are canonicalized by parsing them, so `HTTPS://Sky.org/a/../b.png`
/// and `https://sky.org/b.png` collide. Anything that does not parse as an
/// absolute URL is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Normalizes a raw URL into a cache key. Never fails.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(parsed) => Self(parsed.to_string()),
            Err(_) => Self(raw.to_string()),
        }
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("https://example.org/img/1.png", "https://example.org/img/1.png" ; "already_canonical")]
    #[test_case("HTTPS://Example.ORG/img/1.png", "https://example.org/img/1.png" ; "scheme_and_host_lowercased")]
    #[test_case("https://example.org/a/../b.png", "https://example.org/b.png" ; "dot_segments_removed")]
    #[test_case("https://example.org:443/b.png", "https://example.org/b.png" ; "default_port_dropped")]
    #[test_case("https://example.org", "https://example.org/" ; "empty_path_gets_slash")]
    #[test_case("/api/images/42", "/api/images/42" ; "relative_kept_verbatim")]
    #[test_case("not a url", "not a url" ; "garbage_kept_verbatim")]
    fn test_normalize(raw: &str, expected: &str) {
        assert_eq!(CacheKey::normalize(raw).as_str(), expected);
    }

    #[test]
    fn test_equivalent_urls_collide() {
        assert_eq!(
            CacheKey::normalize("https://EXAMPLE.org/x.png"),
            CacheKey::normalize("https://example.org/./x.png")
        );
    }
}
