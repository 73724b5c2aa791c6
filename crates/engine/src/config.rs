//! Executor configuration, loadable from TOML.
//!
//! ```toml
//! node_timeout_secs = 30
//! max_concurrent_nodes = 8
//! fail_fast = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tuning knobs for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// How long a single executor call may take before it is reported as
    /// a node failure. A node's own `timeout_secs` takes precedence.
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,
    /// Upper bound on executor calls in flight within one run.
    #[serde(default)]
    pub max_concurrent_nodes: Option<usize>,
    /// Stop scheduling new nodes after the first failure.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

fn default_node_timeout_secs() -> u64 {
    30
}

fn default_fail_fast() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout_secs(),
            max_concurrent_nodes: None,
            fail_fast: default_fail_fast(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_timeout_secs == 0 {
            return Err(ConfigError::Invalid("node_timeout_secs must be at least 1".into()));
        }
        if self.max_concurrent_nodes == Some(0) {
            return Err(ConfigError::Invalid("max_concurrent_nodes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }
}
