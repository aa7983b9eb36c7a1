//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// subs.ro API key. Required; its absence is the one fatal
    /// configuration error the pipeline surfaces to the host UI.
    #[serde(default)]
    pub api_key: String,

    /// Provider API base URL. Overridable for tests.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Language the ranker prefers when a query spans several.
    #[serde(default)]
    pub preferred_language: Option<String>,

    /// Upper bound on concurrently searched languages. Kept small to
    /// respect the provider's rate limits.
    #[serde(default = "default_max_parallel_languages")]
    pub max_parallel_languages: usize,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum cached artifacts; values below 1 are raised to 1.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_base_url() -> String {
    crate::provider::subsro::DEFAULT_BASE_URL.to_string()
}
fn default_max_parallel_languages() -> usize {
    4
}
fn default_cache_max_entries() -> usize {
    256
}
fn default_cache_ttl_secs() -> u64 {
    // One viewing session.
    3600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            preferred_language: None,
            max_parallel_languages: default_max_parallel_languages(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Config {
    /// Create a config with the given API key and defaults for the rest.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(format!("invalid config: {e}")))
    }

    /// Cache entry lifetime as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
