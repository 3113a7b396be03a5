//! Message selection.
//!
//! Final ordering and safety pass over the messages a run wants to send:
//! cancellations go first so superseded work is reclaimed promptly, then
//! transitions in state-model priority order; duplicates per replica and
//! messages aimed at departed sessions are swept out.

use std::collections::BTreeSet;

use meson_core::model::Message;

use crate::cache::ClusterSnapshot;
use crate::stages::ResourceMap;

pub fn select_messages(
    snapshot: &ClusterSnapshot, resources: &ResourceMap, generated: Vec<Message>, cancellations: Vec<Message>,
) -> Vec<Message> {
    let mut transitions = generated;
    transitions.sort_by_key(|msg| {
        let priority = resources
            .get(msg.resource())
            .and_then(|resource| snapshot.state_model(&resource.state_model_def))
            .map(|smd| smd.transition_priority(msg.from_state(), msg.to_state()))
            .unwrap_or(usize::MAX);
        (priority, msg.resource().to_string(), msg.partition().to_string(), msg.tgt_name().to_string())
    });

    let mut seen: BTreeSet<(String, String, String)> = BTreeSet::new();
    let mut selected = Vec::with_capacity(cancellations.len() + transitions.len());
    for msg in cancellations.into_iter().chain(transitions) {
        // The target session must still be current; a participant which
        // bounced since generation picks its work up from the next run.
        match snapshot.session_of(msg.tgt_name()) {
            Some(session) if session == msg.tgt_session_id() => {}
            _ => {
                tracing::debug!(msg_id = %msg.id(), instance = %msg.tgt_name(), "dropping message for departed session");
                continue;
            }
        }
        let key = (msg.tgt_name().to_string(), msg.resource().to_string(), msg.partition().to_string());
        if msg.msg_type() == Some(meson_core::model::MessageType::StateTransition) && !seen.insert(key) {
            continue;
        }
        selected.push(msg);
    }
    selected
}
