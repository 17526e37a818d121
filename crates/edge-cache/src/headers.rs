//! Cache bookkeeping headers and header projection.

use http::header::HeaderName;
use http::HeaderValue;

use edge_core::EdgeResponse;

/// Header names read and written by the cache.
pub mod header_names {
    /// Standard Cache-Control.
    pub const CACHE_CONTROL: &str = "cache-control";
    /// Standard Set-Cookie.
    pub const SET_COOKIE: &str = "set-cookie";
    /// Cache status (HIT, MISS, STALE, REVALIDATED).
    pub const EDGE_CACHE_STATUS: &str = "x-edge-cache-status";
    /// Primary expiry in epoch ms, or "0".
    pub const EDGE_CACHE_EXPIRED_AT: &str = "x-edge-cache-expired-at";
    /// Stale-while-revalidate window end, "0" or "-1".
    pub const EDGE_CACHE_STALE_EXPIRED_AT: &str = "x-edge-cache-stale-expired-at";
    /// Stale-if-error window end, "0" or "-1".
    pub const EDGE_CACHE_STALE_ERR_EXPIRED_AT: &str = "x-edge-cache-stale-err-expired-at";
    /// Edge-facing cache-control for successful entries.
    pub const ORIGIN_CACHE_CONTROL: &str = "x-origin-cache-control";
    /// Edge-facing cache-control for entries kept through an origin error.
    pub const ORIGIN_ERROR_CACHE_CONTROL: &str = "x-origin-error-cache-control";
    /// Client-facing cache-control.
    pub const CLIENT_CACHE_CONTROL: &str = "x-client-cache-control";
}

use header_names::*;

/// Bookkeeping headers hidden from clients unless debugging.
pub const HIDDEN_HEADERS: [&str; 6] = [
    CLIENT_CACHE_CONTROL,
    EDGE_CACHE_EXPIRED_AT,
    EDGE_CACHE_STALE_ERR_EXPIRED_AT,
    EDGE_CACHE_STALE_EXPIRED_AT,
    ORIGIN_CACHE_CONTROL,
    ORIGIN_ERROR_CACHE_CONTROL,
];

/// One header change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMutation {
    /// Replace the header with a single value.
    Set(HeaderName, HeaderValue),
    /// Remove every value of the header.
    Delete(HeaderName),
}

/// Ordered header changes; later changes to the same name win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMutations(Vec<HeaderMutation>);

impl HeaderMutations {
    /// Create an empty set of changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header. `name` must be a lower-case header name.
    pub fn set(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.0.push(HeaderMutation::Set(HeaderName::from_static(name), value));
        self
    }

    /// Set a header when a value is given, delete it otherwise.
    pub fn set_or_delete(self, name: &'static str, value: Option<HeaderValue>) -> Self {
        match value {
            Some(value) => self.set(name, value),
            None => self.delete(name),
        }
    }

    /// Delete a header. `name` must be a lower-case header name.
    pub fn delete(mut self, name: &'static str) -> Self {
        self.0.push(HeaderMutation::Delete(HeaderName::from_static(name)));
        self
    }

    /// Append another set of changes after these.
    pub fn then(mut self, other: HeaderMutations) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Iterate the changes in order.
    pub fn iter(&self) -> impl Iterator<Item = &HeaderMutation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Return a copy of `response` with `mutations` applied. The body is kept
/// as is and the input is left untouched.
pub fn project(response: &EdgeResponse, mutations: &HeaderMutations) -> EdgeResponse {
    let mut projected = response.clone();
    for mutation in mutations.iter() {
        match mutation {
            HeaderMutation::Set(name, value) => {
                projected.headers.insert(name.clone(), value.clone());
            }
            HeaderMutation::Delete(name) => {
                projected.headers.remove(name);
            }
        }
    }
    projected
}

/// Deletions of the bookkeeping headers, or nothing in debug mode.
pub fn debug_filter(debug: bool) -> HeaderMutations {
    if debug {
        return HeaderMutations::new();
    }
    HIDDEN_HEADERS
        .into_iter()
        .fold(HeaderMutations::new(), HeaderMutations::delete)
}
