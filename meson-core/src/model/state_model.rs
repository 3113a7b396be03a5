//! Replica state-model definitions.
//!
//! A state model is a finite-state machine over replica states: an ordered
//! priority list of states, an initial state, a table of legal transitions
//! in priority order, and a per-state upper bound on how many replicas of a
//! partition may occupy the state at once. Bounds may be literal counts or
//! the tokens `N` (number of live instances) and `R` (replica count); `-1`
//! means unbounded.

use std::collections::VecDeque;

use crate::record::Record;

const FIELD_INITIAL_STATE: &str = "INITIAL_STATE";
const FIELD_STATE_PRIORITY_LIST: &str = "STATE_PRIORITY_LIST";
const FIELD_TRANSITION_PRIORITY_LIST: &str = "TRANSITION_PRIORITY_LIST";
const FIELD_STATE_COUNTS: &str = "STATE_COUNTS";

/// The state a replica is moved to when its handler fails.
pub const ERROR_STATE: &str = "ERROR";
/// The terminal state: the replica is removed from the partition.
pub const DROPPED_STATE: &str = "DROPPED";

/// A state model definition, immutable after registration.
#[derive(Clone, Debug)]
pub struct StateModelDefinition {
    record: Record,
}

impl StateModelDefinition {
    pub fn from_record(record: Record) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    /// The definition's registered name.
    pub fn name(&self) -> &str {
        &self.record.id
    }

    /// States in priority order, highest first.
    pub fn states(&self) -> &[String] {
        self.record.get_list(FIELD_STATE_PRIORITY_LIST).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The highest-priority state.
    pub fn top_state(&self) -> Option<&str> {
        self.states().first().map(String::as_str)
    }

    /// The state new replicas start in.
    pub fn initial_state(&self) -> &str {
        self.record.get_simple(FIELD_INITIAL_STATE).unwrap_or(DROPPED_STATE)
    }

    /// Whether the given state is part of this model.
    pub fn contains_state(&self, state: &str) -> bool {
        self.states().iter().any(|have| have == state)
    }

    /// Legal transitions as `FROM-TO` pairs in priority order.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.record
            .get_list(FIELD_TRANSITION_PRIORITY_LIST)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|edge| edge.split_once('-'))
    }

    /// Whether `from -> to` is an edge of the transition table.
    pub fn is_valid_transition(&self, from: &str, to: &str) -> bool {
        self.transitions().any(|(have_from, have_to)| have_from == from && have_to == to)
    }

    /// The priority rank of the `from -> to` edge; lower is more urgent.
    pub fn transition_priority(&self, from: &str, to: &str) -> usize {
        self.transitions()
            .position(|(have_from, have_to)| have_from == from && have_to == to)
            .unwrap_or(usize::MAX)
    }

    /// The priority rank of a state; lower is higher priority.
    pub fn state_priority(&self, state: &str) -> usize {
        self.states().iter().position(|have| have == state).unwrap_or(usize::MAX)
    }

    /// Compute the next hop from `from` toward `target` along table edges.
    ///
    /// Breadth-first over the transition table, so the hop chosen lies on a
    /// shortest path; ties fall to the higher-priority edge. Returns `None`
    /// when `target` is unreachable from `from`.
    pub fn next_state(&self, from: &str, target: &str) -> Option<String> {
        if from == target {
            return None;
        }
        let mut visited = vec![from.to_string()];
        let mut queue: VecDeque<(String, String)> = VecDeque::new();
        for (edge_from, edge_to) in self.transitions() {
            if edge_from == from {
                if edge_to == target {
                    return Some(edge_to.to_string());
                }
                visited.push(edge_to.to_string());
                queue.push_back((edge_to.to_string(), edge_to.to_string()));
            }
        }
        while let Some((node, first_hop)) = queue.pop_front() {
            for (edge_from, edge_to) in self.transitions() {
                if edge_from != node {
                    continue;
                }
                if edge_to == target {
                    return Some(first_hop);
                }
                if !visited.iter().any(|have| have == edge_to) {
                    visited.push(edge_to.to_string());
                    queue.push_back((edge_to.to_string(), first_hop.clone()));
                }
            }
        }
        None
    }

    /// Resolve the upper bound for a state given live-instance and replica
    /// counts. `None` means unbounded.
    pub fn state_upper_bound(&self, state: &str, num_live: u32, num_replicas: u32) -> Option<u32> {
        let raw = self.record.get_map(FIELD_STATE_COUNTS)?.get(state)?;
        match raw.as_str() {
            "-1" => None,
            "N" => Some(num_live),
            "R" => Some(num_replicas),
            count => count.parse().ok(),
        }
    }

    /// Build a definition from parts. Used by the built-in models and tests.
    pub fn build(
        name: &str, states: &[(&str, &str)], initial_state: &str, transitions: &[(&str, &str)],
    ) -> Self {
        let mut record = Record::new(name);
        record.set_simple(FIELD_INITIAL_STATE, initial_state);
        record.set_list(FIELD_STATE_PRIORITY_LIST, states.iter().map(|(state, _)| state.to_string()).collect());
        record.set_list(
            FIELD_TRANSITION_PRIORITY_LIST,
            transitions.iter().map(|(from, to)| format!("{}-{}", from, to)).collect(),
        );
        let counts = record.map_mut(FIELD_STATE_COUNTS);
        for (state, count) in states {
            counts.insert(state.to_string(), count.to_string());
        }
        Self { record }
    }

    /// The built-in MasterSlave model: one master, up to `R` slaves.
    pub fn master_slave() -> Self {
        Self::build(
            "MasterSlave",
            &[("MASTER", "1"), ("SLAVE", "R"), ("OFFLINE", "-1"), (ERROR_STATE, "-1"), (DROPPED_STATE, "-1")],
            "OFFLINE",
            &[
                ("MASTER", "SLAVE"),
                ("SLAVE", "MASTER"),
                ("OFFLINE", "SLAVE"),
                ("SLAVE", "OFFLINE"),
                ("OFFLINE", DROPPED_STATE),
                (ERROR_STATE, "OFFLINE"),
                (ERROR_STATE, DROPPED_STATE),
            ],
        )
    }

    /// The built-in OnlineOffline model.
    pub fn online_offline() -> Self {
        Self::build(
            "OnlineOffline",
            &[("ONLINE", "R"), ("OFFLINE", "-1"), (ERROR_STATE, "-1"), (DROPPED_STATE, "-1")],
            "OFFLINE",
            &[
                ("ONLINE", "OFFLINE"),
                ("OFFLINE", "ONLINE"),
                ("OFFLINE", DROPPED_STATE),
                (ERROR_STATE, "OFFLINE"),
                (ERROR_STATE, DROPPED_STATE),
            ],
        )
    }
}
