//! The per-(instance, session, resource) current-state record.

use std::collections::BTreeMap;

use crate::record::Record;

const FIELD_SESSION_ID: &str = "SESSION_ID";
const FIELD_STATE_MODEL_DEF: &str = "STATE_MODEL_DEF";
const FIELD_BUCKET_SIZE: &str = "BUCKET_SIZE";
const MAP_KEY_CURRENT_STATE: &str = "CURRENT_STATE";
const MAP_KEY_REQUESTED_STATE: &str = "REQUESTED_STATE";
const MAP_KEY_INFO: &str = "INFO";

/// The authoritative observed state of one resource's partitions on one
/// participant, scoped by the participant's store session.
///
/// The participant owns every field except `REQUESTED_STATE`, which only the
/// controller writes; it marks a transition in flight from the controller's
/// viewpoint.
#[derive(Clone, Debug)]
pub struct CurrentState {
    record: Record,
}

impl CurrentState {
    pub fn new(resource: impl Into<String>, session_id: impl Into<String>, state_model_def: impl Into<String>) -> Self {
        let mut record = Record::new(resource);
        record.set_simple(FIELD_SESSION_ID, session_id);
        record.set_simple(FIELD_STATE_MODEL_DEF, state_model_def);
        Self { record }
    }

    pub fn from_record(record: Record) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn resource(&self) -> &str {
        &self.record.id
    }

    pub fn session_id(&self) -> &str {
        self.record.get_simple(FIELD_SESSION_ID).unwrap_or("")
    }

    pub fn state_model_def(&self) -> &str {
        self.record.get_simple(FIELD_STATE_MODEL_DEF).unwrap_or("")
    }

    /// Sharding factor for bucketed storage; `0` means unsharded.
    pub fn bucket_size(&self) -> u32 {
        self.record.get_simple(FIELD_BUCKET_SIZE).and_then(|val| val.parse().ok()).unwrap_or(0)
    }

    pub fn set_bucket_size(&mut self, size: u32) {
        self.record.set_simple(FIELD_BUCKET_SIZE, size.to_string());
    }

    /// The reported state of one partition.
    pub fn state(&self, partition: &str) -> Option<&str> {
        self.record
            .get_map(partition)
            .and_then(|map| map.get(MAP_KEY_CURRENT_STATE))
            .map(String::as_str)
    }

    pub fn set_state(&mut self, partition: &str, state: impl Into<String>) {
        self.record.map_mut(partition).insert(MAP_KEY_CURRENT_STATE.into(), state.into());
    }

    /// All partitions and their reported states.
    pub fn partition_states(&self) -> BTreeMap<&str, &str> {
        self.record
            .map_fields
            .iter()
            .filter_map(|(partition, map)| {
                map.get(MAP_KEY_CURRENT_STATE).map(|state| (partition.as_str(), state.as_str()))
            })
            .collect()
    }

    /// The controller-requested target state of one partition, if in flight.
    pub fn requested_state(&self, partition: &str) -> Option<&str> {
        self.record
            .get_map(partition)
            .and_then(|map| map.get(MAP_KEY_REQUESTED_STATE))
            .map(String::as_str)
    }

    pub fn set_requested_state(&mut self, partition: &str, state: impl Into<String>) {
        self.record.map_mut(partition).insert(MAP_KEY_REQUESTED_STATE.into(), state.into());
    }

    pub fn clear_requested_state(&mut self, partition: &str) {
        if let Some(map) = self.record.map_fields.get_mut(partition) {
            map.remove(MAP_KEY_REQUESTED_STATE);
        }
    }

    /// Handler-returned info for one partition's last transition.
    pub fn info(&self, partition: &str) -> Option<&str> {
        self.record.get_map(partition).and_then(|map| map.get(MAP_KEY_INFO)).map(String::as_str)
    }

    pub fn set_info(&mut self, partition: &str, info: impl Into<String>) {
        self.record.map_mut(partition).insert(MAP_KEY_INFO.into(), info.into());
    }

    /// Remove a partition entirely, used when a replica reaches DROPPED.
    pub fn remove_partition(&mut self, partition: &str) {
        self.record.map_fields.remove(partition);
    }
}
