use meson_core::model::{RebalanceScope, ThrottleConfig, ThrottleScope};

use crate::fixtures::{empty_snapshot, semi_auto_ideal_state, snapshot_instance, snapshot_state};
use crate::monitor::NullSink;
use crate::rebalancer::RebalancerRegistry;

use super::{compute_best_possible, compute_current_state, compute_intermediate, compute_resources};

#[test]
fn master_handoff_keeps_at_most_one_master() {
    let mut snapshot = empty_snapshot("alpha");
    for instance in ["i1", "i2"] {
        snapshot_instance(&mut snapshot, instance);
    }
    // Preference now favors i2, but i1 still holds mastership.
    snapshot
        .ideal_states
        .insert("db".into(), semi_auto_ideal_state("db", 1, 2, &["i2", "i1"]));
    snapshot_state(&mut snapshot, "i1", "db", "MasterSlave", "db_0", "MASTER");
    snapshot_state(&mut snapshot, "i2", "db", "MasterSlave", "db_0", "SLAVE");

    let resources = compute_resources(&snapshot, &NullSink);
    let current = compute_current_state(&snapshot);
    let best = compute_best_possible(&snapshot, &resources, &current, &RebalancerRegistry::new(), &NullSink);
    let step = compute_intermediate(&snapshot, &resources, &current, &best, "controller-0", &NullSink);

    let map = step.partition_map("db", "db_0").expect("partition must have a step");
    assert_eq!(map.get("i1").map(String::as_str), Some("SLAVE"), "old master must step down first");
    assert_eq!(
        map.get("i2").map(String::as_str),
        Some("SLAVE"),
        "promotion must wait until the old master has stepped down"
    );
}

#[test]
fn recovery_beats_load_balance_for_the_last_slot() {
    let mut snapshot = empty_snapshot("alpha");
    for instance in ["i1", "i2", "i3"] {
        snapshot_instance(&mut snapshot, instance);
    }
    snapshot.config.set_throttle_configs(&[ThrottleConfig {
        scope: ThrottleScope::Cluster,
        rebalance: RebalanceScope::Any,
        max: 1,
    }]);
    // db_1 is healthy but wants its slave moved; db_0 has no master at all.
    // db_0 sorts after db_1 lexically, so only recovery priority can win it
    // the single budget slot.
    snapshot
        .ideal_states
        .insert("a_db".into(), semi_auto_ideal_state("a_db", 2, 2, &["i1", "i2"]));
    snapshot_state(&mut snapshot, "i1", "a_db", "MasterSlave", "a_db_0", "MASTER");
    snapshot_state(&mut snapshot, "i3", "a_db", "MasterSlave", "a_db_0", "SLAVE");
    snapshot_state(&mut snapshot, "i1", "a_db", "MasterSlave", "a_db_1", "SLAVE");
    snapshot_state(&mut snapshot, "i2", "a_db", "MasterSlave", "a_db_1", "SLAVE");

    let resources = compute_resources(&snapshot, &NullSink);
    let current = compute_current_state(&snapshot);
    let best = compute_best_possible(&snapshot, &resources, &current, &RebalancerRegistry::new(), &NullSink);
    let step = compute_intermediate(&snapshot, &resources, &current, &best, "controller-0", &NullSink);

    // The recovery partition (a_db_1, masterless) gets the slot.
    let recovery = step.partition_map("a_db", "a_db_1").expect("step must exist");
    assert_eq!(recovery.get("i1").map(String::as_str), Some("MASTER"));
    // The load-balance partition is left untouched this round.
    let load = step.partition_map("a_db", "a_db_0").expect("step must exist");
    assert_eq!(load.get("i3").map(String::as_str), Some("SLAVE"), "load-balance work must wait");
}

#[test]
fn pending_transitions_consume_budget_first() {
    let mut snapshot = empty_snapshot("alpha");
    snapshot_instance(&mut snapshot, "i1");
    snapshot.config.set_throttle_configs(&[ThrottleConfig {
        scope: ThrottleScope::Instance,
        rebalance: RebalanceScope::Any,
        max: 1,
    }]);
    snapshot
        .ideal_states
        .insert("db".into(), semi_auto_ideal_state("db", 2, 1, &["i1"]));
    let session = snapshot.session_of("i1").expect("i1 must be live").to_string();
    snapshot.messages.insert(
        "i1".into(),
        vec![meson_core::model::Message::new_state_transition(
            "controller-0",
            "i1",
            &session,
            "db",
            "db_0",
            "MasterSlave",
            "OFFLINE",
            "SLAVE",
        )],
    );

    let resources = compute_resources(&snapshot, &NullSink);
    let current = compute_current_state(&snapshot);
    let best = compute_best_possible(&snapshot, &resources, &current, &RebalancerRegistry::new(), &NullSink);
    let step = compute_intermediate(&snapshot, &resources, &current, &best, "controller-0", &NullSink);

    // db_1 wants OFFLINE→SLAVE but the in-flight db_0 transition holds the
    // instance's only slot.
    let map = step.partition_map("db", "db_1").expect("step must exist");
    assert!(
        map.get("i1").is_none() || map.get("i1").map(String::as_str) == Some("OFFLINE"),
        "no new transition may be admitted, got {:?}",
        map.get("i1")
    );
}

#[test]
fn frozen_partition_reports_input_fault() {
    let mut snapshot = empty_snapshot("alpha");
    for instance in ["i1", "i2"] {
        snapshot_instance(&mut snapshot, instance);
    }
    snapshot
        .ideal_states
        .insert("db".into(), semi_auto_ideal_state("db", 1, 2, &["i1", "i2"]));
    snapshot_state(&mut snapshot, "i2", "db", "MasterSlave", "db_0", "ZOMBIE");

    let resources = compute_resources(&snapshot, &NullSink);
    let current = compute_current_state(&snapshot);
    let best = compute_best_possible(&snapshot, &resources, &current, &RebalancerRegistry::new(), &NullSink);
    let step = compute_intermediate(&snapshot, &resources, &current, &best, "controller-0", &NullSink);

    assert_eq!(step.skipped_partitions(), &[("db".to_string(), "db_0".to_string())]);
    let map = step.partition_map("db", "db_0").expect("step must exist");
    assert_eq!(map.get("i2").map(String::as_str), Some("ZOMBIE"), "frozen partition must not move");
    assert!(map.get("i1").is_none(), "no transitions may be admitted for a frozen partition");
}
