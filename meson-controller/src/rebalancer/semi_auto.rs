//! SEMI_AUTO: operator-declared preference lists, controller-assigned states.

use crate::cache::ClusterSnapshot;
use crate::stages::{CurrentStateOutput, Resource};

use super::{assign_states_by_priority, finalize_partition_map, is_assignable, is_partition_disabled, ResourceAssignment};

/// Assign states along each partition's declared preference list, in list
/// order, filling state-model upper bounds top-down.
pub(super) fn compute(snapshot: &ClusterSnapshot, resource: &Resource, current: &CurrentStateOutput) -> ResourceAssignment {
    let smd = match snapshot.state_model(&resource.state_model_def) {
        Some(smd) => smd,
        None => return ResourceAssignment::new(),
    };
    let num_live = snapshot.live_instances.len() as u32;

    let mut assignment = ResourceAssignment::new();
    for partition in &resource.partitions {
        let preference: Vec<String> = resource
            .ideal_state
            .preference_list(partition)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter(|instance| is_assignable(snapshot, resource, instance))
            .filter(|instance| !is_partition_disabled(snapshot, &resource.name, partition, instance))
            .cloned()
            .collect();
        let assigned = assign_states_by_priority(smd, &preference, num_live, resource.replicas);
        let current_map = current.current_state_map(&resource.name, partition);
        let map = finalize_partition_map(snapshot, resource, partition, smd, assigned, &current_map);
        assignment.insert(partition.clone(), map);
    }
    assignment
}
