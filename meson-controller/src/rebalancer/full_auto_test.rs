use meson_core::model::StateModelDefinition;

use crate::fixtures::{empty_snapshot, full_auto_ideal_state, snapshot_instance, snapshot_state};
use crate::monitor::NullSink;
use crate::stages::{compute_current_state, compute_resources};

use super::full_auto::compute_preference_lists;

#[test]
fn placement_is_deterministic_and_even() {
    let mut snapshot = empty_snapshot("alpha");
    for instance in ["i1", "i2", "i3", "i4"] {
        snapshot_instance(&mut snapshot, instance);
    }
    snapshot
        .ideal_states
        .insert("db".into(), full_auto_ideal_state("db", 8, 2, "OnlineOffline"));

    let resources = compute_resources(&snapshot, &NullSink);
    let resource = resources.get("db").expect("resource must exist");
    let current = compute_current_state(&snapshot);
    let smd = StateModelDefinition::online_offline();

    let first = compute_preference_lists(&snapshot, resource, &current, &smd);
    let second = compute_preference_lists(&snapshot, resource, &current, &smd);
    assert_eq!(first, second, "placement must be a pure function of the snapshot");

    // 8 partitions * 2 replicas over 4 instances: 4 replicas each.
    let mut load = std::collections::BTreeMap::new();
    for list in first.values() {
        assert_eq!(list.len(), 2);
        for instance in list {
            *load.entry(instance.clone()).or_insert(0u32) += 1;
        }
    }
    for (instance, have) in load {
        assert_eq!(have, 4, "expected even spread, {} got {}", instance, have);
    }
}

#[test]
fn replicas_spread_across_fault_zones() {
    let mut snapshot = empty_snapshot("alpha");
    snapshot.config.set_topology_path("/zone/host");
    snapshot.config.set_fault_zone_type("zone");
    for (instance, domain) in [("i1", "/z1/h1"), ("i2", "/z1/h2"), ("i3", "/z2/h3"), ("i4", "/z2/h4")] {
        snapshot_instance(&mut snapshot, instance);
        snapshot
            .instance_configs
            .get_mut(instance)
            .expect("instance must be configured")
            .set_domain(domain);
    }
    snapshot
        .ideal_states
        .insert("db".into(), full_auto_ideal_state("db", 4, 2, "OnlineOffline"));

    let resources = compute_resources(&snapshot, &NullSink);
    let resource = resources.get("db").expect("resource must exist");
    let current = compute_current_state(&snapshot);
    let smd = StateModelDefinition::online_offline();

    let lists = compute_preference_lists(&snapshot, resource, &current, &smd);
    for (partition, list) in lists {
        let zones: std::collections::BTreeSet<&str> = list
            .iter()
            .map(|instance| if instance == "i1" || instance == "i2" { "z1" } else { "z2" })
            .collect();
        assert_eq!(zones.len(), 2, "replicas of {} must land in distinct zones, got {:?}", partition, list);
    }
}

#[test]
fn existing_healthy_holders_are_sticky() {
    let mut snapshot = empty_snapshot("alpha");
    for instance in ["i1", "i2", "i3"] {
        snapshot_instance(&mut snapshot, instance);
    }
    snapshot
        .ideal_states
        .insert("db".into(), full_auto_ideal_state("db", 1, 2, "OnlineOffline"));
    // i3 already serves the partition; placement must keep it.
    snapshot_state(&mut snapshot, "i3", "db", "OnlineOffline", "db_0", "ONLINE");

    let resources = compute_resources(&snapshot, &NullSink);
    let resource = resources.get("db").expect("resource must exist");
    let current = compute_current_state(&snapshot);
    let smd = StateModelDefinition::online_offline();

    let lists = compute_preference_lists(&snapshot, resource, &current, &smd);
    let list = lists.get("db_0").expect("partition must be placed");
    assert!(list.contains(&"i3".to_string()), "healthy holder must be kept, got {:?}", list);
}
