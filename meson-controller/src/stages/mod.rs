//! The controller pipeline stages.
//!
//! Each stage is a pure function over the snapshot and the outputs of the
//! stages before it; the runner in `crate::pipeline` sequences them. Stages
//! never touch the store: all writes happen in `crate::dispatch` and the
//! external-view apply step, after every stage has succeeded.

mod best_possible;
mod current_state;
#[cfg(test)]
mod current_state_test;
mod external_view;
mod intermediate;
#[cfg(test)]
mod intermediate_test;
mod message_gen;
#[cfg(test)]
mod message_gen_test;
mod message_select;
mod resource;

pub use best_possible::{compute_best_possible, BestPossibleOutput};
pub use current_state::{compute_current_state, CurrentStateOutput};
pub use external_view::{compute_external_views, ExternalViewOutput};
pub use intermediate::{compute_intermediate, IntermediateOutput};
pub use message_gen::generate_messages;
pub use message_select::select_messages;
pub use resource::{compute_resources, Resource, ResourceMap};
