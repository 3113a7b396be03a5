use meson_core::model::Message;

use crate::fixtures::{empty_snapshot, snapshot_instance, snapshot_state};

use super::compute_current_state;

#[test]
fn aggregates_states_and_requested_fields() {
    let mut snapshot = empty_snapshot("alpha");
    snapshot_instance(&mut snapshot, "i1");
    snapshot_instance(&mut snapshot, "i2");
    snapshot_state(&mut snapshot, "i1", "db", "MasterSlave", "db_0", "MASTER");
    snapshot_state(&mut snapshot, "i2", "db", "MasterSlave", "db_0", "SLAVE");
    snapshot
        .current_states
        .get_mut("i2")
        .and_then(|states| states.get_mut("db"))
        .expect("record must exist")
        .set_requested_state("db_0", "MASTER");

    let output = compute_current_state(&snapshot);
    assert_eq!(output.current_state("db", "db_0", "i1"), Some("MASTER"));
    assert_eq!(output.current_state("db", "db_0", "i2"), Some("SLAVE"));
    assert_eq!(output.requested_state("db", "db_0", "i2"), Some("MASTER"));
    assert_eq!(output.resource_state_model("db"), Some("MasterSlave"));
    assert_eq!(output.mapped_partitions("db"), vec!["db_0".to_string()]);
}

#[test]
fn pending_messages_require_live_session() {
    let mut snapshot = empty_snapshot("alpha");
    snapshot_instance(&mut snapshot, "i1");
    let session = snapshot.session_of("i1").expect("i1 must be live").to_string();

    let valid = Message::new_state_transition("controller-0", "i1", &session, "db", "db_0", "MasterSlave", "OFFLINE", "SLAVE");
    let stale = Message::new_state_transition("controller-0", "i1", "old-session", "db", "db_1", "MasterSlave", "OFFLINE", "SLAVE");
    snapshot.messages.insert("i1".into(), vec![valid, stale]);

    let output = compute_current_state(&snapshot);
    assert!(output.pending_message("db", "db_0", "i1").is_some(), "live-session message must be pending");
    assert!(output.pending_message("db", "db_1", "i1").is_none(), "stale-session message must be ignored");
    assert_eq!(output.pending_count(), 1);
}
