//! Rebalancers: per-resource computation of the best-possible assignment.
//!
//! One variant per rebalance mode, dispatched as a tagged enum; USER_DEFINED
//! resolves a plugin from the registry by name. Every variant is a
//! deterministic function of the snapshot: same inputs, same assignment.

mod customized;
mod full_auto;
#[cfg(test)]
mod full_auto_test;
mod semi_auto;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{bail, Result};

use meson_core::model::{RebalanceMode, StateModelDefinition, DROPPED_STATE};

use crate::cache::ClusterSnapshot;
use crate::stages::{CurrentStateOutput, Resource};

/// partition → instance → target state.
pub type ResourceAssignment = BTreeMap<String, BTreeMap<String, String>>;

/// A rebalancer plugin, registered by name for USER_DEFINED resources.
pub trait RebalancerPlugin: Send + Sync {
    /// Compute the full target assignment for one resource.
    fn compute(
        &self, snapshot: &ClusterSnapshot, resource: &Resource, current: &CurrentStateOutput,
    ) -> ResourceAssignment;
}

/// The registry of named rebalancer plugins.
#[derive(Clone, Default)]
pub struct RebalancerRegistry {
    plugins: HashMap<String, Arc<dyn RebalancerPlugin>>,
}

impl RebalancerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn RebalancerPlugin>) {
        self.plugins.insert(name.into(), plugin);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn RebalancerPlugin>> {
        self.plugins.get(name)
    }
}

/// Compute the best-possible assignment for one resource.
pub fn compute_assignment(
    snapshot: &ClusterSnapshot, resource: &Resource, current: &CurrentStateOutput, registry: &RebalancerRegistry,
) -> Result<ResourceAssignment> {
    match resource.rebalance_mode {
        RebalanceMode::SemiAuto => Ok(semi_auto::compute(snapshot, resource, current)),
        RebalanceMode::FullAuto => Ok(full_auto::compute(snapshot, resource, current)),
        RebalanceMode::Customized => Ok(customized::compute(snapshot, resource, current)),
        RebalanceMode::UserDefined => {
            let name = resource.ideal_state.rebalancer_name().unwrap_or_default();
            match registry.get(name) {
                Some(plugin) => Ok(plugin.compute(snapshot, resource, current)),
                None => bail!("rebalancer plugin {} is not registered", name),
            }
        }
    }
}

/// Whether an instance may hold replicas of the given resource at all:
/// configured, enabled, tag-matched, and live (or within the delay window).
pub(crate) fn is_assignable(snapshot: &ClusterSnapshot, resource: &Resource, instance: &str) -> bool {
    let config = match snapshot.instance_configs.get(instance) {
        Some(config) => config,
        None => return false,
    };
    if !config.enabled() || !snapshot.effectively_live(instance) {
        return false;
    }
    match resource.ideal_state.instance_group_tag() {
        Some(tag) => config.has_tag(tag),
        None => true,
    }
}

/// Whether a specific partition is disabled on the instance.
pub(crate) fn is_partition_disabled(snapshot: &ClusterSnapshot, resource: &str, partition: &str, instance: &str) -> bool {
    snapshot
        .instance_configs
        .get(instance)
        .map(|config| config.is_partition_disabled(resource, partition))
        .unwrap_or(false)
}

/// Assign states to an ordered preference list, filling per-state upper
/// bounds top-down in state priority order. Unbounded states receive no
/// explicit assignment; instances beyond the bounded capacity are left out.
pub(crate) fn assign_states_by_priority(
    smd: &StateModelDefinition, preference: &[String], num_live: u32, replicas: u32,
) -> BTreeMap<String, String> {
    let mut assigned = BTreeMap::new();
    let mut cursor = preference.iter();
    for state in smd.states() {
        let bound = match smd.state_upper_bound(state, num_live, replicas) {
            Some(bound) => bound,
            None => continue,
        };
        for _ in 0..bound {
            match cursor.next() {
                Some(instance) => {
                    assigned.insert(instance.clone(), state.clone());
                }
                None => return assigned,
            }
        }
    }
    assigned
}

/// Complete a partition's assignment with exits: live holders not assigned
/// are driven to DROPPED; holders disabled for the partition are driven to
/// the model's initial state instead of holding a replica.
pub(crate) fn finalize_partition_map(
    snapshot: &ClusterSnapshot, resource: &Resource, partition: &str, smd: &StateModelDefinition,
    mut assigned: BTreeMap<String, String>, current_map: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    for (instance, state) in current_map {
        if state == DROPPED_STATE || !snapshot.is_live(instance) {
            continue;
        }
        let disabled = !snapshot.is_instance_enabled(instance)
            || is_partition_disabled(snapshot, &resource.name, partition, instance);
        if disabled {
            assigned.insert(instance.clone(), smd.initial_state().to_string());
        } else if !assigned.contains_key(instance) {
            assigned.insert(instance.clone(), DROPPED_STATE.to_string());
        }
    }
    assigned
}
