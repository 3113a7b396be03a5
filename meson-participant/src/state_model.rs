//! The state-model handler contract.
//!
//! Applications supply a `StateModel` implementation per replica; the
//! executor binds one handler instance to each (resource, partition) it
//! hosts and routes every transition for that replica through it, one at a
//! time. Factories are registered per state-model name.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use meson_core::model::Message;

/// A user-supplied replica state machine.
///
/// One instance exists per (resource, partition) hosted on a participant,
/// and lives until the replica is dropped. Transitions are invoked strictly
/// one at a time per instance.
#[async_trait]
pub trait StateModel: Send + 'static {
    /// Execute the transition `from -> to` for this replica.
    ///
    /// The returned string, if any, is published as the replica's INFO
    /// field. An error marks the replica ERROR.
    async fn on_transition(&mut self, from: &str, to: &str, msg: &Message) -> Result<Option<String>>;

    /// The transition for `msg` was cancelled before or during execution.
    async fn on_cancel(&mut self, _msg: &Message) {}

    /// The replica is being re-initialized after an ERROR recovery.
    async fn on_reset(&mut self) {}
}

/// Creates handler instances for replicas of one state model.
pub trait StateModelFactory: Send + Sync + 'static {
    fn create(&self, resource: &str, partition: &str) -> Box<dyn StateModel>;
}

/// Factories keyed by state-model name.
#[derive(Clone, Default)]
pub struct StateModelRegistry {
    factories: HashMap<String, Arc<dyn StateModelFactory>>,
}

impl StateModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for the given state-model name.
    pub fn register(&mut self, state_model: impl Into<String>, factory: Arc<dyn StateModelFactory>) {
        self.factories.insert(state_model.into(), factory);
    }

    pub fn get(&self, state_model: &str) -> Option<&Arc<dyn StateModelFactory>> {
        self.factories.get(state_model)
    }
}
