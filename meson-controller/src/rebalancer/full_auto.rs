//! FULL_AUTO: controller-computed placement.
//!
//! Preference lists are derived rather than declared. Placement spreads
//! replicas across instances proportionally to capacity, isolates replicas
//! across fault zones where enough zones exist, keeps existing legal
//! assignments in place, and honors instance-group tag filtering. The result
//! is a pure function of the snapshot.

use std::collections::{BTreeMap, BTreeSet};

use meson_core::model::{StateModelDefinition, DROPPED_STATE, ERROR_STATE};

use crate::cache::ClusterSnapshot;
use crate::stages::{CurrentStateOutput, Resource};

use super::{assign_states_by_priority, finalize_partition_map, is_assignable, is_partition_disabled, ResourceAssignment};

pub(super) fn compute(snapshot: &ClusterSnapshot, resource: &Resource, current: &CurrentStateOutput) -> ResourceAssignment {
    let smd = match snapshot.state_model(&resource.state_model_def) {
        Some(smd) => smd,
        None => return ResourceAssignment::new(),
    };
    let num_live = snapshot.live_instances.len() as u32;

    let preference_lists = compute_preference_lists(snapshot, resource, current, smd);
    let mut assignment = ResourceAssignment::new();
    for partition in &resource.partitions {
        let preference = preference_lists.get(partition).cloned().unwrap_or_default();
        let assigned = assign_states_by_priority(smd, &preference, num_live, resource.replicas);
        let current_map = current.current_state_map(&resource.name, partition);
        let map = finalize_partition_map(snapshot, resource, partition, smd, assigned, &current_map);
        assignment.insert(partition.clone(), map);
    }
    assignment
}

/// Derive a preference list per partition.
pub(crate) fn compute_preference_lists(
    snapshot: &ClusterSnapshot, resource: &Resource, current: &CurrentStateOutput, smd: &StateModelDefinition,
) -> BTreeMap<String, Vec<String>> {
    let candidates: Vec<String> = snapshot
        .instance_configs
        .keys()
        .filter(|instance| is_assignable(snapshot, resource, instance))
        .cloned()
        .collect();
    let zones: BTreeMap<String, String> = candidates
        .iter()
        .map(|instance| (instance.clone(), fault_zone_of(snapshot, instance)))
        .collect();
    let distinct_zones: BTreeSet<&String> = zones.values().collect();
    let replicas = resource.replicas as usize;
    // Zone isolation is only enforceable when zones outnumber replicas.
    let isolate_zones = distinct_zones.len() >= replicas.max(1);

    let mut load: BTreeMap<String, u32> = candidates.iter().map(|instance| (instance.clone(), 0)).collect();
    let capacity = |instance: &str| {
        snapshot
            .instance_configs
            .get(instance)
            .map(|config| config.capacity())
            .unwrap_or(1)
    };

    let mut lists = BTreeMap::new();
    for partition in &resource.partitions {
        let want = replicas.min(candidates.len());
        let mut chosen: Vec<String> = Vec::with_capacity(want);
        let mut used_zones: BTreeSet<String> = BTreeSet::new();

        // Sticky pass: keep existing healthy holders, highest state first.
        let current_map = current.current_state_map(&resource.name, partition);
        let mut holders: Vec<(&String, &String)> = current_map
            .iter()
            .filter(|(_, state)| state.as_str() != ERROR_STATE && state.as_str() != DROPPED_STATE)
            .collect();
        holders.sort_by_key(|(instance, state)| (smd.state_priority(state), (*instance).clone()));
        for (instance, _) in holders {
            if chosen.len() >= want {
                break;
            }
            if !candidates.contains(instance)
                || is_partition_disabled(snapshot, &resource.name, partition, instance)
                || chosen.contains(instance)
            {
                continue;
            }
            let zone = zones.get(instance).cloned().unwrap_or_default();
            if isolate_zones && used_zones.contains(&zone) {
                continue;
            }
            used_zones.insert(zone);
            chosen.push(instance.clone());
        }

        // Fill pass: least-loaded per capacity, preferring unused zones.
        while chosen.len() < want {
            let pool: Vec<&String> = candidates
                .iter()
                .filter(|instance| !chosen.contains(instance))
                .filter(|instance| !is_partition_disabled(snapshot, &resource.name, partition, instance))
                .collect();
            if pool.is_empty() {
                break;
            }
            let zone_free: Vec<&String> = pool
                .iter()
                .filter(|instance| match zones.get(instance.as_str()) {
                    Some(zone) => !used_zones.contains(zone),
                    None => true,
                })
                .copied()
                .collect();
            let pick_from = if zone_free.is_empty() { pool } else { zone_free };
            // Compare load/capacity ratios by cross-multiplying.
            let pick = pick_from
                .into_iter()
                .min_by(|a, b| {
                    let load_a = load.get(a.as_str()).copied().unwrap_or(0) * capacity(b.as_str());
                    let load_b = load.get(b.as_str()).copied().unwrap_or(0) * capacity(a.as_str());
                    load_a.cmp(&load_b).then_with(|| a.cmp(b))
                })
                .cloned();
            match pick {
                Some(instance) => {
                    used_zones.insert(zones.get(&instance).cloned().unwrap_or_default());
                    chosen.push(instance);
                }
                None => break,
            }
        }

        for instance in &chosen {
            *load.entry(instance.clone()).or_insert(0) += 1;
        }
        lists.insert(partition.clone(), chosen);
    }
    lists
}

/// The fault zone an instance occupies, derived from its domain and the
/// cluster topology. Instances without topology data are their own zone.
pub(crate) fn fault_zone_of(snapshot: &ClusterSnapshot, instance: &str) -> String {
    let fallback = || instance.to_string();
    let zone_type = match snapshot.config.fault_zone_type() {
        Some(zone_type) => zone_type,
        None => return fallback(),
    };
    let topology = match snapshot.config.topology_path() {
        Some(topology) => topology,
        None => return fallback(),
    };
    let domain = match snapshot.instance_configs.get(instance).and_then(|config| config.domain()) {
        Some(domain) => domain,
        None => return fallback(),
    };
    let position = topology.split('/').filter(|seg| !seg.is_empty()).position(|seg| seg == zone_type);
    match position {
        Some(position) => domain
            .split('/')
            .filter(|seg| !seg.is_empty())
            .nth(position)
            .map(str::to_string)
            .unwrap_or_else(fallback),
        None => fallback(),
    }
}
