//! Message generation.
//!
//! Emits one state-transition message for every (instance, partition) where
//! the intermediate step differs from current and no satisfying pending
//! message exists. Every emitted transition must be an edge of the state
//! model; anything else means the upstream stages are broken, and the run
//! aborts before any dispatch.

use meson_core::model::Message;

use crate::cache::ClusterSnapshot;
use crate::pipeline::PipelineError;
use crate::stages::{CurrentStateOutput, IntermediateOutput, ResourceMap};

pub fn generate_messages(
    snapshot: &ClusterSnapshot, resources: &ResourceMap, current: &CurrentStateOutput,
    intermediate: &IntermediateOutput, controller: &str,
) -> Result<Vec<Message>, PipelineError> {
    let mut messages = Vec::new();
    for (name, assignment) in intermediate.resources() {
        let resource = match resources.get(name) {
            Some(resource) => resource,
            None => continue,
        };
        let smd = match snapshot.state_model(&resource.state_model_def) {
            Some(smd) => smd,
            None => continue,
        };
        for (partition, step) in assignment {
            for (instance, target) in step {
                let from = current
                    .current_state(name, partition, instance)
                    .unwrap_or_else(|| smd.initial_state());
                if from == target.as_str() {
                    continue;
                }
                // In flight already; supersession is handled by
                // cancellation, never by a second transition.
                if current.pending_message(name, partition, instance).is_some() {
                    continue;
                }
                if !smd.is_valid_transition(from, target) {
                    return Err(PipelineError::StateModelViolation {
                        resource: name.clone(),
                        partition: partition.clone(),
                        from: from.to_string(),
                        to: target.clone(),
                    });
                }
                let session = match snapshot.session_of(instance) {
                    Some(session) => session,
                    None => continue,
                };
                messages.push(Message::new_state_transition(
                    controller,
                    instance,
                    session,
                    name,
                    partition,
                    &resource.state_model_def,
                    from,
                    target,
                ));
            }
        }
    }
    Ok(messages)
}
