//! Cache keys and the request view the engine needs.

use http::{Method, Uri};
use serde::{Deserialize, Serialize};

/// A cache key uniquely identifying a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Normalize a request to `METHOD scheme://authority/path?query`.
    ///
    /// Headers never take part in the key. Relative URIs keep just the path
    /// and query.
    pub fn from_request(method: &Method, uri: &Uri) -> Self {
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        let path = if path.is_empty() { "/" } else { path };

        match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => {
                Self(format!("{} {}://{}{}", method, scheme, authority, path))
            }
            _ => Self(format!("{} {}", method, path)),
        }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parts of an incoming request the cache engine looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwrRequest {
    /// Request method; only `GET` is cached.
    pub method: Method,
    /// Key the response is stored under.
    pub key: CacheKey,
}

impl SwrRequest {
    /// Create a request view with an explicit key.
    pub fn new(method: Method, key: CacheKey) -> Self {
        Self { method, key }
    }

    /// Shorthand for a `GET` request.
    pub fn get(key: impl Into<String>) -> Self {
        Self::new(Method::GET, CacheKey::new(key))
    }

    /// Derive the key from method and URI.
    pub fn from_parts(method: Method, uri: &Uri) -> Self {
        let key = CacheKey::from_request(&method, uri);
        Self { method, key }
    }

    /// Whether the request is eligible for caching at all.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET
    }
}
