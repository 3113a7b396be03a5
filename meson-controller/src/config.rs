//! Runtime configuration.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The controller's logging config, which uses Rust's `env_logger` directives.
    #[serde(default)]
    pub rust_log: String,
    /// The name of the cluster this controller manages.
    pub cluster: String,
    /// The name under which this controller registers as leader.
    pub controller_name: String,

    /// Debounce window applied to pipeline triggers, in milliseconds.
    #[serde(default = "default_pipeline_debounce_ms")]
    pub pipeline_debounce_ms: u64,
    /// Bounded-staleness refresh interval, in seconds.
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
}

fn default_pipeline_debounce_ms() -> u64 {
    100
}

fn default_refresh_interval_seconds() -> u64 {
    60
}

impl Config {
    /// Create a new config instance from the runtime environment.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// Build an instance for use in tests.
    #[cfg(test)]
    pub fn new_test(cluster: &str) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rust_log: "".into(),
            cluster: cluster.into(),
            controller_name: "controller-0".into(),
            pipeline_debounce_ms: 1,
            refresh_interval_seconds: 60,
        })
    }
}
