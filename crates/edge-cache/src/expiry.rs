//! Expiration timestamps derived from Cache-Control directives.

use std::fmt;

use http::HeaderValue;
use serde::Serialize;

use crate::directives::{Directive, DirectiveSet};

/// Wire value for a window that never closes.
pub const STALE_FOREVER: &str = "-1";

/// Wire value for "already expired".
pub const EXPIRED_IMMEDIATELY: &str = "0";

/// An absolute expiry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "ms", rename_all = "lowercase")]
pub enum Timestamp {
    /// Never fresh. Wire value `"0"`.
    Immediate,
    /// Epoch milliseconds.
    At(u64),
    /// Never expires. Wire value `"-1"`.
    Forever,
}

impl Timestamp {
    /// Parse a wire value. Anything unrecognized counts as already expired.
    pub fn parse(value: &str) -> Self {
        match value {
            STALE_FOREVER => Self::Forever,
            EXPIRED_IMMEDIATELY => Self::Immediate,
            other => other.parse().map(Self::At).unwrap_or(Self::Immediate),
        }
    }

    /// Parse an optional header value; a missing header is already expired.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .map(Self::parse)
            .unwrap_or(Self::Immediate)
    }

    /// `now + seconds`, saturating.
    pub fn after_secs(now_ms: u64, seconds: u64) -> Self {
        Self::At(now_ms.saturating_add(seconds.saturating_mul(1000)))
    }

    /// Whether the point has passed at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self {
            Self::Immediate => true,
            Self::At(at) => now_ms > *at,
            Self::Forever => false,
        }
    }

    /// Header encoding of the timestamp.
    pub fn to_header_value(&self) -> HeaderValue {
        match self {
            Self::Immediate => HeaderValue::from_static(EXPIRED_IMMEDIATELY),
            Self::At(at) => HeaderValue::from(*at),
            Self::Forever => HeaderValue::from_static(STALE_FOREVER),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str(EXPIRED_IMMEDIATELY),
            Self::At(at) => write!(f, "{}", at),
            Self::Forever => f.write_str(STALE_FOREVER),
        }
    }
}

/// Primary freshness: `s-maxage`, falling back to `max-age`.
///
/// A missing, bare or malformed lifetime means the entry is never fresh.
pub fn primary_expiry(directives: &DirectiveSet, now_ms: u64) -> Timestamp {
    let lifetime = if directives.s_maxage.is_present() {
        &directives.s_maxage
    } else {
        &directives.max_age
    };

    match lifetime.seconds() {
        Some(secs) => Timestamp::after_secs(now_ms, secs),
        None => Timestamp::Immediate,
    }
}

/// End of the stale-while-revalidate window.
pub fn stale_while_revalidate_expiry(directives: &DirectiveSet, now_ms: u64) -> Timestamp {
    window_expiry(&directives.stale_while_revalidate, now_ms)
}

/// End of the stale-if-error window.
pub fn stale_if_error_expiry(directives: &DirectiveSet, now_ms: u64) -> Timestamp {
    window_expiry(&directives.stale_if_error, now_ms)
}

fn window_expiry(directive: &Directive, now_ms: u64) -> Timestamp {
    match directive {
        Directive::Absent => Timestamp::Immediate,
        Directive::Present => Timestamp::Forever,
        Directive::Value(_) => match directive.seconds() {
            Some(secs) => Timestamp::after_secs(now_ms, secs),
            None => Timestamp::Immediate,
        },
    }
}

/// The three expiry points of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Expirations {
    pub primary: Timestamp,
    pub stale_while_revalidate: Timestamp,
    pub stale_if_error: Timestamp,
}

impl Expirations {
    /// Compute all three from one directive set.
    pub fn compute(directives: &DirectiveSet, now_ms: u64) -> Self {
        Self {
            primary: primary_expiry(directives, now_ms),
            stale_while_revalidate: stale_while_revalidate_expiry(directives, now_ms),
            stale_if_error: stale_if_error_expiry(directives, now_ms),
        }
    }
}
