//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Switches controlling how the cache engine behaves for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwrConfig {
    /// Keep internal bookkeeping headers on client responses.
    #[serde(default)]
    pub debug: bool,
    /// Bypass caching entirely and always call the origin.
    #[serde(default)]
    pub disable: bool,
}

impl SwrConfig {
    /// Create a configuration with caching enabled and debug headers hidden.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug headers.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Force-disable caching.
    pub fn with_disable(mut self, disable: bool) -> Self {
        self.disable = disable;
        self
    }
}
