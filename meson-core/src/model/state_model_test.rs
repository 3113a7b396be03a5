use super::state_model::{StateModelDefinition, DROPPED_STATE, ERROR_STATE};

#[test]
fn master_slave_shape() {
    let smd = StateModelDefinition::master_slave();
    assert_eq!(smd.top_state(), Some("MASTER"));
    assert_eq!(smd.initial_state(), "OFFLINE");
    assert!(smd.contains_state("SLAVE"));
    assert!(smd.is_valid_transition("SLAVE", "MASTER"));
    assert!(!smd.is_valid_transition("OFFLINE", "MASTER"));
    assert!(smd.is_valid_transition(ERROR_STATE, "OFFLINE"));
}

#[test]
fn next_state_takes_shortest_path() {
    let smd = StateModelDefinition::master_slave();
    assert_eq!(smd.next_state("OFFLINE", "MASTER").as_deref(), Some("SLAVE"));
    assert_eq!(smd.next_state("SLAVE", "MASTER").as_deref(), Some("MASTER"));
    assert_eq!(smd.next_state("MASTER", "OFFLINE").as_deref(), Some("SLAVE"));
    assert_eq!(smd.next_state("MASTER", "MASTER"), None);
    // DROPPED is terminal, nothing is reachable from it.
    assert_eq!(smd.next_state(DROPPED_STATE, "OFFLINE"), None);
}

#[test]
fn upper_bounds_resolve_tokens() {
    let smd = StateModelDefinition::master_slave();
    assert_eq!(smd.state_upper_bound("MASTER", 5, 3), Some(1));
    assert_eq!(smd.state_upper_bound("SLAVE", 5, 3), Some(3));
    assert_eq!(smd.state_upper_bound("OFFLINE", 5, 3), None);
    assert_eq!(smd.state_upper_bound("NO_SUCH_STATE", 5, 3), None);

    let smd = StateModelDefinition::build("NTest", &[("LEADER", "N")], "LEADER", &[]);
    assert_eq!(smd.state_upper_bound("LEADER", 5, 3), Some(5));
}

#[test]
fn transition_priorities_follow_declaration_order() {
    let smd = StateModelDefinition::master_slave();
    assert!(smd.transition_priority("MASTER", "SLAVE") < smd.transition_priority("OFFLINE", "SLAVE"));
    assert_eq!(smd.transition_priority("OFFLINE", "MASTER"), usize::MAX);
}
