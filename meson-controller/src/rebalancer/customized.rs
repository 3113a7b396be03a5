//! CUSTOMIZED: operator-declared instance→state maps, authoritative.

use std::collections::BTreeMap;

use crate::cache::ClusterSnapshot;
use crate::stages::{CurrentStateOutput, Resource};

use super::{finalize_partition_map, is_assignable, is_partition_disabled, ResourceAssignment};

/// Filter each partition's declared map to assignable instances. States
/// outside the resource's model are dropped rather than dispatched.
pub(super) fn compute(snapshot: &ClusterSnapshot, resource: &Resource, current: &CurrentStateOutput) -> ResourceAssignment {
    let smd = match snapshot.state_model(&resource.state_model_def) {
        Some(smd) => smd,
        None => return ResourceAssignment::new(),
    };

    let mut assignment = ResourceAssignment::new();
    for partition in &resource.partitions {
        let declared = resource.ideal_state.instance_state_map(partition);
        let mut assigned = BTreeMap::new();
        if let Some(declared) = declared {
            for (instance, state) in declared {
                if !is_assignable(snapshot, resource, instance)
                    || is_partition_disabled(snapshot, &resource.name, partition, instance)
                {
                    continue;
                }
                if !smd.contains_state(state) {
                    tracing::warn!(
                        resource = %resource.name,
                        partition = %partition,
                        state = %state,
                        "declared state is not part of the resource's state model, ignoring"
                    );
                    continue;
                }
                assigned.insert(instance.clone(), state.clone());
            }
        }
        let current_map = current.current_state_map(&resource.name, partition);
        let map = finalize_partition_map(snapshot, resource, partition, smd, assigned, &current_map);
        assignment.insert(partition.clone(), map);
    }
    assignment
}
