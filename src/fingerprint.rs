// Request fingerprinting.
// Derives the storage key for a request from its method and full URL.

use std::fmt;
use std::hash::Hasher;

use fnv::FnvHasher;

/// Separator between method and URL. Never appears in an HTTP method token.
const SEPARATOR: &str = ":";

/// Fixed-width key naming one cache entry: 16 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a key back from a file stem. Returns None unless it is exactly
    /// 16 lowercase hex digits.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 16
            && s
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the cache key for a request.
///
/// FNV-1a 64 over `"{method}:{url}"`. Headers and body are not part of the
/// key, so requests differing only in those share one entry.
pub fn fingerprint(method: &str, url: &str) -> CacheKey {
    let mut hasher = FnvHasher::default();
    hasher.write(method.as_bytes());
    hasher.write(SEPARATOR.as_bytes());
    hasher.write(url.as_bytes());
    CacheKey(format!("{:016x}", hasher.finish()))
}

/// Compute the cache key for a reqwest request.
pub fn fingerprint_request(request: &reqwest::Request) -> CacheKey {
    fingerprint(request.method().as_str(), request.url().as_str())
}
