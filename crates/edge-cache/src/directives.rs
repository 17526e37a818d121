//! Cache-Control directive parsing and generation.

use std::fmt;

use http::header::CACHE_CONTROL;
use http::HeaderMap;
use serde::Serialize;

/// Client cache-control used when the origin gave no usable `max-age`.
pub const CLIENT_NO_CACHE: &str = "public,max-age=0,must-revalidate";

/// State of a single recognized directive.
///
/// `Present` and `Absent` mean different things for the staleness
/// directives: a bare `stale-while-revalidate` tolerates staleness forever,
/// a missing one tolerates none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Directive {
    /// Not in the header.
    #[default]
    Absent,
    /// In the header without `=value`.
    Present,
    /// In the header with a raw, unvalidated value.
    Value(String),
}

impl Directive {
    /// Whether the directive appears in the header at all.
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Raw value, if one was given.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Value if given and non-empty.
    pub fn non_empty_value(&self) -> Option<&str> {
        self.value().filter(|v| !v.is_empty())
    }

    /// Value as whole seconds. Malformed values yield `None`; digit strings
    /// too large for `u64` saturate.
    pub fn seconds(&self) -> Option<u64> {
        let value = self.value()?;
        match value.parse() {
            Ok(secs) => Some(secs),
            Err(_) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => Some(u64::MAX),
            Err(_) => None,
        }
    }
}

/// Names of the directives this cache understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveName {
    Public,
    Private,
    MaxAge,
    SMaxAge,
    StaleWhileRevalidate,
    StaleIfError,
}

impl DirectiveName {
    /// All recognized directives, in generation order.
    pub const ALL: [DirectiveName; 6] = [
        Self::Public,
        Self::Private,
        Self::MaxAge,
        Self::SMaxAge,
        Self::StaleWhileRevalidate,
        Self::StaleIfError,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::MaxAge => "max-age",
            Self::SMaxAge => "s-maxage",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
            Self::StaleIfError => "stale-if-error",
        }
    }

    /// Look up a lower-cased wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == name)
    }
}

impl fmt::Display for DirectiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recognized directives of one Cache-Control header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DirectiveSet {
    pub public: Directive,
    pub private: Directive,
    pub max_age: Directive,
    #[serde(rename = "s-maxage")]
    pub s_maxage: Directive,
    pub stale_while_revalidate: Directive,
    pub stale_if_error: Directive,
}

impl DirectiveSet {
    /// Parse a Cache-Control value. `None` yields an all-absent set.
    ///
    /// Whitespace is dropped, tokens are split on `,` and then on the first
    /// `=`. Keys are case-insensitive and unknown keys are ignored. A repeated
    /// key keeps its last occurrence. Parsing never fails.
    pub fn parse(value: Option<&str>) -> Self {
        let mut set = Self::default();
        let Some(value) = value else {
            return set;
        };

        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        for token in compact.split(',') {
            let (key, val) = match token.split_once('=') {
                Some((key, val)) => (key, Some(val)),
                None => (token, None),
            };
            let Some(name) = DirectiveName::from_wire(&key.to_ascii_lowercase()) else {
                continue;
            };
            *set.get_mut(name) = match val {
                Some(v) => Directive::Value(v.to_string()),
                None => Directive::Present,
            };
        }

        set
    }

    /// Parse the `cache-control` header of a response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::parse(headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()))
    }

    /// Get a directive by name.
    pub fn get(&self, name: DirectiveName) -> &Directive {
        match name {
            DirectiveName::Public => &self.public,
            DirectiveName::Private => &self.private,
            DirectiveName::MaxAge => &self.max_age,
            DirectiveName::SMaxAge => &self.s_maxage,
            DirectiveName::StaleWhileRevalidate => &self.stale_while_revalidate,
            DirectiveName::StaleIfError => &self.stale_if_error,
        }
    }

    fn get_mut(&mut self, name: DirectiveName) -> &mut Directive {
        match name {
            DirectiveName::Public => &mut self.public,
            DirectiveName::Private => &mut self.private,
            DirectiveName::MaxAge => &mut self.max_age,
            DirectiveName::SMaxAge => &mut self.s_maxage,
            DirectiveName::StaleWhileRevalidate => &mut self.stale_while_revalidate,
            DirectiveName::StaleIfError => &mut self.stale_if_error,
        }
    }

    /// Whether the origin opted into shared caching (`s-maxage` with a value).
    pub fn is_edge_cacheable(&self) -> bool {
        self.s_maxage.non_empty_value().is_some()
    }

    /// Cache-Control stored with a successful entry.
    pub fn edge_cache_control(&self) -> String {
        format!("public,s-maxage={}", self.s_maxage.non_empty_value().unwrap_or("0"))
    }

    /// Cache-Control stored with an entry kept because the origin failed.
    ///
    /// Carries `stale-if-error` forward so later failures know stale serving
    /// was allowed.
    pub fn edge_error_cache_control(&self) -> String {
        let mut value = self.edge_cache_control();
        match self.stale_if_error.non_empty_value() {
            Some(v) => {
                value.push_str(",stale-if-error=");
                value.push_str(v);
            }
            None if self.stale_if_error.is_present() => value.push_str(",stale-if-error"),
            None => {}
        }
        value
    }

    /// Cache-Control sent to clients.
    ///
    /// Only `max-age` is forwarded; without a positive one the client is told
    /// to revalidate every time.
    pub fn client_cache_control(&self) -> String {
        match self.max_age.non_empty_value() {
            Some(v) if self.max_age.seconds() != Some(0) => format!("public,max-age={}", v),
            _ => CLIENT_NO_CACHE.to_string(),
        }
    }
}

impl fmt::Display for DirectiveSet {
    /// Renders the recognized directives in a normalized form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in DirectiveName::ALL {
            let directive = self.get(name);
            if !directive.is_present() {
                continue;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match directive.value() {
                Some(v) => write!(f, "{}={}", name, v)?,
                None => write!(f, "{}", name)?,
            }
        }
        Ok(())
    }
}
