//! Typed wrappers over the records persisted in the coordination store.

mod cluster;
mod current_state;
mod external_view;
mod instance;
mod message;
mod resource;
mod state_model;
#[cfg(test)]
mod state_model_test;

pub use cluster::{ClusterConfig, RebalanceScope, ThrottleConfig, ThrottleScope};
pub use current_state::CurrentState;
pub use external_view::ExternalView;
pub use instance::{InstanceConfig, LiveInstance};
pub use message::{Message, MessageType};
pub use resource::{IdealState, RebalanceMode, ResourceConfig};
pub use state_model::{StateModelDefinition, ERROR_STATE, DROPPED_STATE};
