//! The Meson participant runtime.
//!
//! Consumes inbound state-transition messages, runs them through
//! user-supplied state-model handlers with strict per-partition
//! serialization, and publishes the resulting current state back to the
//! coordination store.

pub mod config;
pub mod dispatcher;
#[cfg(test)]
mod dispatcher_test;
pub mod executor;
#[cfg(test)]
mod executor_test;
#[cfg(test)]
mod fixtures;
pub mod manager;
#[cfg(test)]
mod manager_test;
pub mod state_model;
pub mod watcher;

pub use config::Config;
pub use manager::Participant;
pub use state_model::{StateModel, StateModelFactory, StateModelRegistry};
