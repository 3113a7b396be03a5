//! The public, eventually consistent view of a resource's assignment.

use std::collections::BTreeMap;

use crate::record::Record;

/// Aggregated partition→instance→state map for one resource, written by the
/// controller from observed current states.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalView {
    record: Record,
}

impl ExternalView {
    pub fn new(resource: impl Into<String>) -> Self {
        Self { record: Record::new(resource) }
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

    pub fn state_map(&self, partition: &str) -> Option<&BTreeMap<String, String>> {
        self.record.get_map(partition)
    }

    pub fn set_state_map(&mut self, partition: impl Into<String>, map: BTreeMap<String, String>) {
        self.record.set_map(partition, map);
    }

    pub fn partitions(&self) -> impl Iterator<Item = &str> {
        self.record.map_fields.keys().map(String::as_str)
    }
}
