//! Message dispatch.
//!
//! Writes REQUESTED_STATE onto each target replica's current-state record
//! *before* the message itself, so a crash between the two leaves a
//! discoverable intent rather than a silent one. Messages are then created
//! as one async batch; a version conflict anywhere abandons the batch and
//! leaves recomputation to the next run.

use anyhow::{Context, Result};

use meson_core::error::StoreError;
use meson_core::keys;
use meson_core::model::{CurrentState, Message, MessageType};
use meson_core::store::{CreateMode, StoreAdapter, StoreClient};

use crate::cache::ClusterSnapshot;

/// The result of a dispatch attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchOutcome {
    /// Messages successfully written to participant queues.
    pub dispatched: usize,
    /// Whether the batch was abandoned on a version conflict.
    pub abandoned: bool,
}

/// Verify this controller still holds leadership before writing.
pub async fn fence<C: StoreClient>(adapter: &StoreAdapter<C>, cluster: &str, controller: &str) -> Result<bool> {
    let leader = adapter
        .get_record(&keys::controller_leader(cluster))
        .await
        .context("error reading controller leader record")?;
    Ok(leader.map(|(record, _)| record.id == controller).unwrap_or(false))
}

#[tracing::instrument(level = "debug", skip_all, fields(messages = messages.len()))]
pub async fn dispatch_messages<C: StoreClient>(
    adapter: &StoreAdapter<C>, snapshot: &ClusterSnapshot, messages: &[Message], controller: &str,
) -> Result<DispatchOutcome> {
    if messages.is_empty() {
        return Ok(DispatchOutcome::default());
    }
    if !fence(adapter, &snapshot.cluster, controller).await? {
        tracing::warn!("leadership lost, abandoning dispatch");
        return Ok(DispatchOutcome { dispatched: 0, abandoned: true });
    }

    // Intent pass: mark every targeted replica before any message exists.
    // Cancellations leave the original intent in place; the participant
    // clears it when the transition resolves.
    for msg in messages {
        if msg.msg_type() != Some(MessageType::StateTransition) {
            continue;
        }
        let path = keys::current_state(&snapshot.cluster, msg.tgt_name(), msg.tgt_session_id(), msg.resource());
        let (partition, to_state) = (msg.partition().to_string(), msg.to_state().to_string());
        let (resource, session, model) =
            (msg.resource().to_string(), msg.tgt_session_id().to_string(), msg.state_model_def().to_string());
        let res = adapter
            .update(&path, move |record| {
                let mut state = match record {
                    Some(record) => CurrentState::from_record(record),
                    None => CurrentState::new(resource.clone(), session.clone(), model.clone()),
                };
                state.set_requested_state(&partition, to_state.clone());
                state.into_record()
            })
            .await;
        match res {
            Ok(_) => {}
            Err(StoreError::VersionConflict { .. }) => {
                tracing::warn!(msg_id = %msg.id(), "version conflict writing requested state, abandoning batch");
                return Ok(DispatchOutcome { dispatched: 0, abandoned: true });
            }
            Err(err) => return Err(err).context("error writing requested state"),
        }
    }

    // Message pass: batch-create every message, then inspect outcomes.
    let items: Vec<(String, meson_core::record::Record)> = messages
        .iter()
        .map(|msg| {
            (
                keys::message(&snapshot.cluster, msg.tgt_name(), msg.id()),
                msg.record().clone(),
            )
        })
        .collect();
    let outcomes = adapter
        .multi_create(&items, CreateMode::Persistent)
        .await
        .context("error batch-creating messages")?;

    let mut dispatched = 0;
    let mut abandoned = false;
    for (outcome, msg) in outcomes.iter().zip(messages) {
        match outcome {
            Ok(()) => dispatched += 1,
            Err(StoreError::VersionConflict { .. }) | Err(StoreError::NodeExists(_)) => {
                tracing::warn!(msg_id = %msg.id(), "conflict creating message, batch will be recomputed");
                abandoned = true;
            }
            Err(err) => {
                tracing::error!(error = %err, msg_id = %msg.id(), "error creating message");
                abandoned = true;
            }
        }
    }
    Ok(DispatchOutcome { dispatched, abandoned })
}
