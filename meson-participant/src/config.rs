//! Runtime configuration.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The participant's logging config, which uses Rust's `env_logger` directives.
    #[serde(default)]
    pub rust_log: String,
    /// The name of the cluster this participant belongs to.
    pub cluster: String,
    /// This participant's instance name; must match its registered config.
    pub instance: String,

    /// Maximum concurrently running state-model handlers.
    #[serde(default = "default_executor_workers")]
    pub executor_workers: usize,
    /// Grace period granted to a cancelled handler before its partition is
    /// marked ERROR, in milliseconds.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_executor_workers() -> usize {
    8
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

impl Config {
    /// Create a new config instance from the runtime environment.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// Build an instance for use in tests.
    #[cfg(test)]
    pub fn new_test(cluster: &str, instance: &str) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            rust_log: "".into(),
            cluster: cluster.into(),
            instance: instance.into(),
            executor_workers: 4,
            cancel_grace_ms: 50,
        })
    }
}
