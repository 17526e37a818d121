//! Cache status and the persisted cache entry.

use std::fmt;
use std::str::FromStr;

use http::HeaderValue;
use serde::{Deserialize, Serialize};

use edge_core::EdgeResponse;
use edge_observability::ServedFrom;

use crate::directives::DirectiveSet;
use crate::error::CacheError;
use crate::expiry::{Expirations, Timestamp};
use crate::headers::header_names::*;
use crate::headers::{debug_filter, project, HeaderMutations};

/// Outcome label carried by responses and stored entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    /// Fresh cache served directly.
    Hit,
    /// Origin consulted synchronously.
    Miss,
    /// Expired cache served because the origin failed.
    Stale,
    /// Expired cache served while a refresh runs in the background.
    Revalidated,
}

impl CacheStatus {
    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Stale => "STALE",
            Self::Revalidated => "REVALIDATED",
        }
    }

    /// Header encoding.
    pub fn to_header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }

    /// Counter bucket for metrics.
    pub fn served_from(&self) -> ServedFrom {
        match self {
            Self::Hit => ServedFrom::Hit,
            Self::Miss => ServedFrom::Miss,
            Self::Stale => ServedFrom::Stale,
            Self::Revalidated => ServedFrom::Revalidated,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStatus {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIT" => Ok(Self::Hit),
            "MISS" => Ok(Self::Miss),
            "STALE" => Ok(Self::Stale),
            "REVALIDATED" => Ok(Self::Revalidated),
            other => Err(CacheError::UnknownStatus(other.to_string())),
        }
    }
}

/// A cached response together with the metadata that drives revalidation.
///
/// Entries are values: every state change produces a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Current label.
    pub status: CacheStatus,
    /// Primary freshness and the two staleness windows.
    pub expirations: Expirations,
    /// Edge cache-control for successful entries.
    pub origin_cache_control: Option<HeaderValue>,
    /// Edge cache-control for entries kept through an origin error.
    pub origin_error_cache_control: Option<HeaderValue>,
    /// Cache-control to send to clients.
    pub client_cache_control: Option<HeaderValue>,
    /// Status, headers and body of the cached response.
    pub response: EdgeResponse,
}

impl CacheEntry {
    /// Build an entry from a fresh origin response.
    ///
    /// The entry starts out labeled `Miss`.
    pub fn from_origin(response: EdgeResponse, directives: &DirectiveSet, now_ms: u64) -> Self {
        Self {
            status: CacheStatus::Miss,
            expirations: Expirations::compute(directives, now_ms),
            origin_cache_control: HeaderValue::try_from(directives.edge_cache_control()).ok(),
            origin_error_cache_control: HeaderValue::try_from(directives.edge_error_cache_control()).ok(),
            client_cache_control: HeaderValue::try_from(directives.client_cache_control()).ok(),
            response,
        }
    }

    /// Decode a response previously produced by `to_response`.
    ///
    /// Fails when the status header is missing or unknown. Missing timestamps
    /// decode as already expired.
    pub fn from_response(response: EdgeResponse) -> Result<Self, CacheError> {
        let status = response
            .header(EDGE_CACHE_STATUS)
            .ok_or_else(|| CacheError::InvalidEntry(format!("missing {}", EDGE_CACHE_STATUS)))?
            .parse()?;

        let headers = &response.headers;
        let expirations = Expirations {
            primary: Timestamp::from_header(headers.get(EDGE_CACHE_EXPIRED_AT)),
            stale_while_revalidate: Timestamp::from_header(headers.get(EDGE_CACHE_STALE_EXPIRED_AT)),
            stale_if_error: Timestamp::from_header(headers.get(EDGE_CACHE_STALE_ERR_EXPIRED_AT)),
        };

        Ok(Self {
            status,
            expirations,
            origin_cache_control: headers.get(ORIGIN_CACHE_CONTROL).cloned(),
            origin_error_cache_control: headers.get(ORIGIN_ERROR_CACHE_CONTROL).cloned(),
            client_cache_control: headers.get(CLIENT_CACHE_CONTROL).cloned(),
            response,
        })
    }

    /// Same entry with a new label.
    pub fn with_status(mut self, status: CacheStatus) -> Self {
        self.status = status;
        self
    }

    /// Same entry without any `set-cookie` header.
    pub fn without_set_cookie(mut self) -> Self {
        self.response.headers.remove(SET_COOKIE);
        self
    }

    /// Primary freshness has passed and no refresh is already in flight.
    pub fn needs_revalidation(&self, now_ms: u64) -> bool {
        self.status != CacheStatus::Revalidated && self.expirations.primary.is_expired(now_ms)
    }

    pub fn is_stale_while_revalidate_expired(&self, now_ms: u64) -> bool {
        self.expirations.stale_while_revalidate.is_expired(now_ms)
    }

    pub fn is_stale_if_error_expired(&self, now_ms: u64) -> bool {
        self.expirations.stale_if_error.is_expired(now_ms)
    }

    /// Whether the origin allowed serving this entry when it errors.
    pub fn allows_stale_if_error(&self) -> bool {
        self.origin_error_cache_control
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .map(|v| DirectiveSet::parse(Some(v)).stale_if_error.is_present())
            .unwrap_or(false)
    }

    /// Cache-control the stored copy carries: the error variant once the
    /// entry is being kept through an origin failure.
    pub fn edge_cache_control(&self) -> Option<&HeaderValue> {
        match self.status {
            CacheStatus::Stale => self.origin_error_cache_control.as_ref(),
            _ => self.origin_cache_control.as_ref(),
        }
    }

    fn metadata(&self) -> HeaderMutations {
        HeaderMutations::new()
            .set(EDGE_CACHE_STATUS, self.status.to_header_value())
            .set(EDGE_CACHE_EXPIRED_AT, self.expirations.primary.to_header_value())
            .set(EDGE_CACHE_STALE_EXPIRED_AT, self.expirations.stale_while_revalidate.to_header_value())
            .set(EDGE_CACHE_STALE_ERR_EXPIRED_AT, self.expirations.stale_if_error.to_header_value())
            .set_or_delete(ORIGIN_CACHE_CONTROL, self.origin_cache_control.clone())
            .set_or_delete(ORIGIN_ERROR_CACHE_CONTROL, self.origin_error_cache_control.clone())
            .set_or_delete(CLIENT_CACHE_CONTROL, self.client_cache_control.clone())
            .set_or_delete(CACHE_CONTROL, self.edge_cache_control().cloned())
    }

    /// The form written to the store.
    pub fn to_response(&self) -> EdgeResponse {
        project(&self.response, &self.metadata())
    }

    /// The form sent to the client, labeled `status`.
    pub fn serve(&self, status: CacheStatus, debug: bool) -> EdgeResponse {
        let mutations = self
            .metadata()
            .set(EDGE_CACHE_STATUS, status.to_header_value())
            .set_or_delete(CACHE_CONTROL, self.client_cache_control.clone())
            .then(debug_filter(debug));
        project(&self.response, &mutations)
    }

    /// The stored form sent to the client as is, keeping the edge
    /// cache-control. Used for the first response after an origin error.
    pub fn serve_stored(&self, debug: bool) -> EdgeResponse {
        project(&self.response, &self.metadata().then(debug_filter(debug)))
    }
}
