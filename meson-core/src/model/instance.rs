//! Participant instance configuration & liveness records.

use crate::record::Record;

const FIELD_HOST: &str = "HOST";
const FIELD_PORT: &str = "PORT";
const FIELD_ENABLED: &str = "ENABLED";
const FIELD_TAGS: &str = "TAGS";
const FIELD_DOMAIN: &str = "DOMAIN";
const FIELD_CAPACITY: &str = "CAPACITY";
const FIELD_DISABLED_PARTITIONS: &str = "DISABLED_PARTITIONS";
const FIELD_SESSION_ID: &str = "SESSION_ID";
const FIELD_CONTROLLER_EPOCH: &str = "CONTROLLER_EPOCH";

/// The config record of one participant instance.
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    record: Record,
}

impl InstanceConfig {
    /// Create a new enabled instance config.
    pub fn new(instance: impl Into<String>) -> Self {
        let mut record = Record::new(instance);
        record.set_bool(FIELD_ENABLED, true);
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

    /// The instance name.
    pub fn name(&self) -> &str {
        &self.record.id
    }

    pub fn host(&self) -> Option<&str> {
        self.record.get_simple(FIELD_HOST)
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.record.set_simple(FIELD_HOST, host);
    }

    pub fn port(&self) -> Option<u16> {
        self.record.get_simple(FIELD_PORT).and_then(|val| val.parse().ok())
    }

    pub fn set_port(&mut self, port: u16) {
        self.record.set_simple(FIELD_PORT, port.to_string());
    }

    /// Whether the instance may hold assignments. Defaults to enabled.
    pub fn enabled(&self) -> bool {
        self.record.get_bool(FIELD_ENABLED, true)
    }

    pub fn set_enabled(&mut self, val: bool) {
        self.record.set_bool(FIELD_ENABLED, val);
    }

    /// Instance-group tags used for tag-filtered placement.
    pub fn tags(&self) -> &[String] {
        self.record.get_list(FIELD_TAGS).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        let tags = self.record.list_fields.entry(FIELD_TAGS.into()).or_default();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|have| have == tag)
    }

    /// The instance's position in the cluster topology, eg `/zone-2/host-7`.
    ///
    /// Used together with the cluster fault-zone type to derive the fault
    /// zone this instance occupies.
    pub fn domain(&self) -> Option<&str> {
        self.record.get_simple(FIELD_DOMAIN)
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.record.set_simple(FIELD_DOMAIN, domain);
    }

    /// Relative placement capacity; full-auto placement spreads replicas
    /// proportionally to it. Defaults to 1.
    pub fn capacity(&self) -> u32 {
        self.record
            .get_simple(FIELD_CAPACITY)
            .and_then(|val| val.parse().ok())
            .filter(|val| *val > 0)
            .unwrap_or(1)
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.record.set_simple(FIELD_CAPACITY, capacity.to_string());
    }

    /// Whether the given partition of the given resource is disabled here.
    pub fn is_partition_disabled(&self, resource: &str, partition: &str) -> bool {
        self.record
            .get_map(FIELD_DISABLED_PARTITIONS)
            .and_then(|map| map.get(resource))
            .map(|csv| csv.split(',').any(|have| have == partition))
            .unwrap_or(false)
    }

    pub fn disable_partition(&mut self, resource: &str, partition: &str) {
        let map = self.record.map_mut(FIELD_DISABLED_PARTITIONS);
        let entry = map.entry(resource.to_string()).or_default();
        if entry.is_empty() {
            *entry = partition.to_string();
        } else if !entry.split(',').any(|have| have == partition) {
            entry.push(',');
            entry.push_str(partition);
        }
    }
}

/// The ephemeral record marking a participant as live.
///
/// Created under the participant's store session when it starts; the store
/// deletes it when the session ends, which is how the controller observes
/// departure.
#[derive(Clone, Debug)]
pub struct LiveInstance {
    record: Record,
}

impl LiveInstance {
    pub fn new(instance: impl Into<String>, session_id: impl Into<String>) -> Self {
        let mut record = Record::new(instance);
        record.set_simple(FIELD_SESSION_ID, session_id);
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

    pub fn name(&self) -> &str {
        &self.record.id
    }

    /// The store session under which this instance registered.
    pub fn session_id(&self) -> &str {
        self.record.get_simple(FIELD_SESSION_ID).unwrap_or("")
    }

    /// The epoch of the controller generation this instance last saw.
    pub fn controller_epoch(&self) -> Option<i64> {
        self.record.get_i64(FIELD_CONTROLLER_EPOCH)
    }

    pub fn set_controller_epoch(&mut self, epoch: i64) {
        self.record.set_i64(FIELD_CONTROLLER_EPOCH, epoch);
    }
}
