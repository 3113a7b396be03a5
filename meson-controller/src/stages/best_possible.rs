//! Best-possible-state computation.
//!
//! For each resource, delegates to the rebalancer selected by its mode and
//! collects the per-partition instance→state targets the cluster should
//! converge to, ignoring throttles.

use std::collections::BTreeMap;

use crate::cache::ClusterSnapshot;
use crate::monitor::StatusSink;
use crate::rebalancer::{self, RebalancerRegistry, ResourceAssignment};
use crate::stages::{CurrentStateOutput, ResourceMap};

/// resource → partition → instance → target state.
#[derive(Clone, Debug, Default)]
pub struct BestPossibleOutput {
    map: BTreeMap<String, ResourceAssignment>,
}

impl BestPossibleOutput {
    pub fn resource_assignment(&self, resource: &str) -> Option<&ResourceAssignment> {
        self.map.get(resource)
    }

    pub fn partition_map(&self, resource: &str, partition: &str) -> Option<&BTreeMap<String, String>> {
        self.map.get(resource).and_then(|assignment| assignment.get(partition))
    }

    pub fn target_state(&self, resource: &str, partition: &str, instance: &str) -> Option<&str> {
        self.partition_map(resource, partition)
            .and_then(|map| map.get(instance))
            .map(String::as_str)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &ResourceAssignment)> {
        self.map.iter()
    }
}

/// Compute targets for every resource. Resources whose rebalancer fails
/// (eg an unregistered plugin) are skipped and reported.
pub fn compute_best_possible(
    snapshot: &ClusterSnapshot, resources: &ResourceMap, current: &CurrentStateOutput, registry: &RebalancerRegistry,
    sink: &dyn StatusSink,
) -> BestPossibleOutput {
    let mut output = BestPossibleOutput::default();
    for (name, resource) in resources {
        match rebalancer::compute_assignment(snapshot, resource, current, registry) {
            Ok(assignment) => {
                output.map.insert(name.clone(), assignment);
            }
            Err(err) => {
                tracing::warn!(error = ?err, resource = %name, "rebalancer failed, skipping resource");
                sink.config_invalid(name);
            }
        }
    }
    output
}
