//! Current-state aggregation.
//!
//! Folds per-participant current-state reports and outstanding messages
//! into a per-(resource, partition, instance) view. Pending messages carry
//! both their from-state and to-state so downstream stages can account for
//! transitions already in flight when checking state constraints.

use std::collections::BTreeMap;

use meson_core::model::{Message, MessageType};

use crate::cache::ClusterSnapshot;

type PartitionKey = (String, String);

/// The aggregated view of observed state plus in-flight intent.
#[derive(Clone, Debug, Default)]
pub struct CurrentStateOutput {
    /// (resource, partition) → instance → reported state.
    current: BTreeMap<PartitionKey, BTreeMap<String, String>>,
    /// (resource, partition) → instance → pending state-transition message.
    pending: BTreeMap<PartitionKey, BTreeMap<String, Message>>,
    /// (resource, partition) → instance → pending cancellation message.
    cancellations: BTreeMap<PartitionKey, BTreeMap<String, Message>>,
    /// (resource, partition) → instance → controller-requested state.
    requested: BTreeMap<PartitionKey, BTreeMap<String, String>>,
    /// (resource, partition) → instance → handler-reported info.
    info: BTreeMap<PartitionKey, BTreeMap<String, String>>,
    /// resource → state-model name as reported by participants.
    resource_state_models: BTreeMap<String, String>,
    /// resource → bucket size as reported by participants.
    bucket_sizes: BTreeMap<String, u32>,
}

impl CurrentStateOutput {
    /// The reported state of one replica.
    pub fn current_state(&self, resource: &str, partition: &str, instance: &str) -> Option<&str> {
        self.current
            .get(&(resource.to_string(), partition.to_string()))
            .and_then(|map| map.get(instance))
            .map(String::as_str)
    }

    /// instance → reported state for one partition.
    pub fn current_state_map(&self, resource: &str, partition: &str) -> BTreeMap<String, String> {
        self.current
            .get(&(resource.to_string(), partition.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// The pending state-transition message targeting one replica.
    pub fn pending_message(&self, resource: &str, partition: &str, instance: &str) -> Option<&Message> {
        self.pending
            .get(&(resource.to_string(), partition.to_string()))
            .and_then(|map| map.get(instance))
    }

    /// instance → pending message for one partition.
    pub fn pending_message_map(&self, resource: &str, partition: &str) -> BTreeMap<String, Message> {
        self.pending
            .get(&(resource.to_string(), partition.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// The pending cancellation targeting one replica, if any.
    pub fn pending_cancellation(&self, resource: &str, partition: &str, instance: &str) -> Option<&Message> {
        self.cancellations
            .get(&(resource.to_string(), partition.to_string()))
            .and_then(|map| map.get(instance))
    }

    /// The controller-requested state for one replica, if in flight.
    pub fn requested_state(&self, resource: &str, partition: &str, instance: &str) -> Option<&str> {
        self.requested
            .get(&(resource.to_string(), partition.to_string()))
            .and_then(|map| map.get(instance))
            .map(String::as_str)
    }

    /// Handler info for one replica's last transition.
    pub fn info(&self, resource: &str, partition: &str, instance: &str) -> Option<&str> {
        self.info
            .get(&(resource.to_string(), partition.to_string()))
            .and_then(|map| map.get(instance))
            .map(String::as_str)
    }

    /// The state-model name participants report for a resource.
    pub fn resource_state_model(&self, resource: &str) -> Option<&str> {
        self.resource_state_models.get(resource).map(String::as_str)
    }

    /// The bucket size participants report for a resource; `0` is unsharded.
    pub fn bucket_size(&self, resource: &str) -> u32 {
        self.bucket_sizes.get(resource).copied().unwrap_or(0)
    }

    /// Partitions of a resource with any reported or in-flight state.
    pub fn mapped_partitions(&self, resource: &str) -> Vec<String> {
        let mut partitions: Vec<String> = self
            .current
            .keys()
            .chain(self.pending.keys())
            .filter(|(have, _)| have == resource)
            .map(|(_, partition)| partition.clone())
            .collect();
        partitions.sort();
        partitions.dedup();
        partitions
    }

    /// Total pending state-transition messages across the cluster.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }
}

/// Fold the snapshot's current states and message queues into one view.
///
/// Only records scoped by each instance's live session are considered;
/// stale-session records were already separated by the cache. Messages whose
/// target session does not match the instance's live session are ignored
/// here and swept by message selection.
pub fn compute_current_state(snapshot: &ClusterSnapshot) -> CurrentStateOutput {
    let mut output = CurrentStateOutput::default();

    for (instance, states) in &snapshot.current_states {
        for (resource, record) in states {
            output
                .resource_state_models
                .entry(resource.clone())
                .or_insert_with(|| record.state_model_def().to_string());
            if record.bucket_size() > 0 {
                output.bucket_sizes.insert(resource.clone(), record.bucket_size());
            }
            for (partition, state) in record.partition_states() {
                output
                    .current
                    .entry((resource.clone(), partition.to_string()))
                    .or_default()
                    .insert(instance.clone(), state.to_string());
            }
            for (partition, _) in record.partition_states() {
                if let Some(requested) = record.requested_state(partition) {
                    output
                        .requested
                        .entry((resource.clone(), partition.to_string()))
                        .or_default()
                        .insert(instance.clone(), requested.to_string());
                }
                if let Some(info) = record.info(partition) {
                    output
                        .info
                        .entry((resource.clone(), partition.to_string()))
                        .or_default()
                        .insert(instance.clone(), info.to_string());
                }
            }
        }
    }

    for (instance, queue) in &snapshot.messages {
        let session = match snapshot.session_of(instance) {
            Some(session) => session,
            None => continue,
        };
        for msg in queue {
            if msg.tgt_session_id() != session {
                continue;
            }
            let key = (msg.resource().to_string(), msg.partition().to_string());
            match msg.msg_type() {
                Some(MessageType::StateTransition) => {
                    output.pending.entry(key).or_default().insert(instance.clone(), msg.clone());
                }
                Some(MessageType::Cancellation) => {
                    output.cancellations.entry(key).or_default().insert(instance.clone(), msg.clone());
                }
                _ => {}
            }
        }
    }

    output
}
