//! Resolver configuration.
//!
//! Every setting has a default, so an empty JSON object is a valid config.
//! Environment variables override whatever was loaded:
//!
//! - `FIELDGRAPH_GRAPH_TTL_SECS`
//! - `FIELDGRAPH_STORE_TIMEOUT_MS`

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`ResolverConfig::graph_ttl_secs`].
pub const ENV_GRAPH_TTL_SECS: &str = "FIELDGRAPH_GRAPH_TTL_SECS";

/// Environment variable overriding [`ResolverConfig::store_timeout_ms`].
pub const ENV_STORE_TIMEOUT_MS: &str = "FIELDGRAPH_STORE_TIMEOUT_MS";

/// Error type for config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    #[error("invalid config: {0}")]
    Serde(#[from] serde_json::Error),

    /// An environment override is not a valid number.
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Settings for the dependency resolver and its cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Sliding expiry of the cached graph and order, in seconds.
    pub graph_ttl_secs: u64,

    /// Deadline for each cache call, in milliseconds.
    pub store_timeout_ms: u64,

    /// Prefix of the graph hash key (`{prefix}:{workspace}:{base}`).
    pub graph_key_prefix: String,

    /// Prefix of the topological order key.
    pub order_key_prefix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            graph_ttl_secs: 60 * 60 * 24,
            store_timeout_ms: 5_000,
            graph_key_prefix: "graph".to_string(),
            order_key_prefix: "topSort".to_string(),
        }
    }
}

impl ResolverConfig {
    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ttl) = parse_override(&lookup, ENV_GRAPH_TTL_SECS)? {
            self.graph_ttl_secs = ttl;
        }
        if let Some(timeout) = parse_override(&lookup, ENV_STORE_TIMEOUT_MS)? {
            self.store_timeout_ms = timeout;
        }
        Ok(self)
    }

    /// Cache expiry as a duration.
    pub fn graph_ttl(&self) -> Duration {
        Duration::from_secs(self.graph_ttl_secs)
    }

    /// Cache call deadline as a duration.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_override<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        None => Ok(None),
    }
}
