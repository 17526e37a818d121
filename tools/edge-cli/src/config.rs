//! CLI configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use edge_core::SwrConfig;

/// File names searched for, in order.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["edge.toml", ".edge.toml", "edge.json"];

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Cache engine switches.
    #[serde(default)]
    pub swr: SwrConfig,

    /// Simulation defaults.
    #[serde(default)]
    pub simulate: SimulateConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }
}

/// Defaults for `edge simulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateConfig {
    /// Cache key used when a scenario does not name one.
    #[serde(default = "default_key")]
    pub key: String,

    /// Wall clock at `at_secs = 0`, in epoch milliseconds.
    #[serde(default = "default_start_ms")]
    pub start_ms: u64,
}

pub fn default_key() -> String {
    "GET http://localhost/".to_string()
}

fn default_start_ms() -> u64 {
    1_700_000_000_000
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            start_ms: default_start_ms(),
        }
    }
}

/// Generate a default edge.toml config file.
pub fn generate_default_config() -> String {
    r#"# Edge cache configuration

[swr]
# Keep x-edge-cache-* and x-*-cache-control headers on client responses.
debug = false
# Skip the cache entirely and always call the origin.
disable = false

[simulate]
key = "GET http://localhost/"
start_ms = 1700000000000
"#
    .to_string()
}
