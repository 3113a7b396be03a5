use maplit::btreemap;

use crate::fixtures::{empty_snapshot, semi_auto_ideal_state, snapshot_instance, snapshot_state};
use crate::monitor::NullSink;
use crate::pipeline::PipelineError;

use super::{compute_current_state, compute_resources, generate_messages, IntermediateOutput};

#[test]
fn emits_only_changed_replicas() {
    let mut snapshot = empty_snapshot("alpha");
    for instance in ["i1", "i2"] {
        snapshot_instance(&mut snapshot, instance);
    }
    snapshot
        .ideal_states
        .insert("db".into(), semi_auto_ideal_state("db", 1, 2, &["i1", "i2"]));
    snapshot_state(&mut snapshot, "i1", "db", "MasterSlave", "db_0", "SLAVE");

    let resources = compute_resources(&snapshot, &NullSink);
    let current = compute_current_state(&snapshot);
    let mut intermediate = IntermediateOutput::default();
    intermediate.insert_step_for_test(
        "db",
        "db_0",
        btreemap! { "i1".to_string() => "MASTER".to_string(), "i2".to_string() => "SLAVE".to_string() },
    );

    let messages =
        generate_messages(&snapshot, &resources, &current, &intermediate, "controller-0").expect("generation must succeed");
    assert_eq!(messages.len(), 2);
    let promote = messages.iter().find(|msg| msg.tgt_name() == "i1").expect("i1 message");
    assert_eq!((promote.from_state(), promote.to_state()), ("SLAVE", "MASTER"));
    let bootstrap = messages.iter().find(|msg| msg.tgt_name() == "i2").expect("i2 message");
    assert_eq!((bootstrap.from_state(), bootstrap.to_state()), ("OFFLINE", "SLAVE"));
    for msg in &messages {
        let expected = snapshot.session_of(msg.tgt_name()).expect("session");
        assert_eq!(msg.tgt_session_id(), expected, "messages must carry the live session");
    }
}

#[test]
fn illegal_edge_aborts_generation() {
    let mut snapshot = empty_snapshot("alpha");
    snapshot_instance(&mut snapshot, "i1");
    snapshot
        .ideal_states
        .insert("db".into(), semi_auto_ideal_state("db", 1, 1, &["i1"]));

    let resources = compute_resources(&snapshot, &NullSink);
    let current = compute_current_state(&snapshot);
    let mut intermediate = IntermediateOutput::default();
    // OFFLINE→MASTER is not an edge of the MasterSlave model.
    intermediate.insert_step_for_test("db", "db_0", btreemap! { "i1".to_string() => "MASTER".to_string() });

    match generate_messages(&snapshot, &resources, &current, &intermediate, "controller-0") {
        Err(PipelineError::StateModelViolation { .. }) => {}
        other => panic!("expected a state-model violation, got {:?}", other.map(|messages| messages.len())),
    }
}
