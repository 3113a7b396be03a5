//! The Meson cluster controller.
//!
//! Drives a fleet of participant processes toward the declared target
//! assignment of partitioned resources. The controller observes live
//! membership and the reported state of every replica, computes a legal
//! next step toward the ideal assignment, and dispatches state-transition
//! messages while respecting state-model constraints, throttles, priorities
//! and fault-zone topology.

pub mod admin;
pub mod app;
pub mod cache;
pub mod config;
pub mod dispatch;
#[cfg(test)]
mod fixtures;
pub mod gc;
pub mod monitor;
pub mod pipeline;
pub mod rebalancer;
pub mod stages;

pub use config::Config;
pub use pipeline::{PipelineError, PipelineRunner, RunOutcome};
