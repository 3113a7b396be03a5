//! Resource declarations: ideal state & per-resource config.

use std::collections::BTreeMap;

use crate::record::Record;

const FIELD_NUM_PARTITIONS: &str = "NUM_PARTITIONS";
const FIELD_REPLICAS: &str = "REPLICAS";
const FIELD_REBALANCE_MODE: &str = "REBALANCE_MODE";
const FIELD_STATE_MODEL_DEF_REF: &str = "STATE_MODEL_DEF_REF";
const FIELD_INSTANCE_GROUP_TAG: &str = "INSTANCE_GROUP_TAG";
const FIELD_MIN_ACTIVE_REPLICAS: &str = "MIN_ACTIVE_REPLICAS";
const FIELD_REBALANCER_NAME: &str = "REBALANCER_NAME";
const FIELD_RESOURCE_ENABLED: &str = "ENABLED";
const FIELD_THROTTLE_OVERRIDES: &str = "STATE_TRANSITION_THROTTLE_CONFIGS";

/// How the target assignment for a resource is computed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RebalanceMode {
    /// Operator-provided preference lists; controller assigns states.
    SemiAuto,
    /// Controller computes placement and states.
    FullAuto,
    /// Operator-provided instance→state maps, authoritative.
    Customized,
    /// Delegated to a named rebalancer plugin.
    UserDefined,
}

impl RebalanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceMode::SemiAuto => "SEMI_AUTO",
            RebalanceMode::FullAuto => "FULL_AUTO",
            RebalanceMode::Customized => "CUSTOMIZED",
            RebalanceMode::UserDefined => "USER_DEFINED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SEMI_AUTO" => Some(RebalanceMode::SemiAuto),
            "FULL_AUTO" => Some(RebalanceMode::FullAuto),
            "CUSTOMIZED" => Some(RebalanceMode::Customized),
            "USER_DEFINED" => Some(RebalanceMode::UserDefined),
            _ => None,
        }
    }
}

/// The declarative target placement and mode of one resource.
///
/// List fields hold per-partition preference lists (SEMI_AUTO); map fields
/// hold per-partition instance→state maps (CUSTOMIZED).
#[derive(Clone, Debug)]
pub struct IdealState {
    record: Record,
}

impl IdealState {
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

    pub fn num_partitions(&self) -> u32 {
        self.record
            .get_simple(FIELD_NUM_PARTITIONS)
            .and_then(|val| val.parse().ok())
            .unwrap_or(0)
    }

    pub fn set_num_partitions(&mut self, num: u32) {
        self.record.set_simple(FIELD_NUM_PARTITIONS, num.to_string());
    }

    pub fn replicas(&self) -> u32 {
        self.record.get_simple(FIELD_REPLICAS).and_then(|val| val.parse().ok()).unwrap_or(0)
    }

    pub fn set_replicas(&mut self, replicas: u32) {
        self.record.set_simple(FIELD_REPLICAS, replicas.to_string());
    }

    pub fn rebalance_mode(&self) -> Option<RebalanceMode> {
        self.record.get_simple(FIELD_REBALANCE_MODE).and_then(RebalanceMode::parse)
    }

    pub fn set_rebalance_mode(&mut self, mode: RebalanceMode) {
        self.record.set_simple(FIELD_REBALANCE_MODE, mode.as_str());
    }

    /// The name of the state model governing this resource's replicas.
    pub fn state_model_def_ref(&self) -> Option<&str> {
        self.record.get_simple(FIELD_STATE_MODEL_DEF_REF)
    }

    pub fn set_state_model_def_ref(&mut self, name: impl Into<String>) {
        self.record.set_simple(FIELD_STATE_MODEL_DEF_REF, name);
    }

    /// Placement is restricted to instances carrying this tag, when set.
    pub fn instance_group_tag(&self) -> Option<&str> {
        self.record.get_simple(FIELD_INSTANCE_GROUP_TAG)
    }

    pub fn set_instance_group_tag(&mut self, tag: impl Into<String>) {
        self.record.set_simple(FIELD_INSTANCE_GROUP_TAG, tag);
    }

    /// The replica floor below which a partition is in recovery.
    pub fn min_active_replicas(&self) -> Option<u32> {
        self.record.get_simple(FIELD_MIN_ACTIVE_REPLICAS).and_then(|val| val.parse().ok())
    }

    pub fn set_min_active_replicas(&mut self, min: u32) {
        self.record.set_simple(FIELD_MIN_ACTIVE_REPLICAS, min.to_string());
    }

    /// The registered plugin name used when the mode is USER_DEFINED.
    pub fn rebalancer_name(&self) -> Option<&str> {
        self.record.get_simple(FIELD_REBALANCER_NAME)
    }

    pub fn set_rebalancer_name(&mut self, name: impl Into<String>) {
        self.record.set_simple(FIELD_REBALANCER_NAME, name);
    }

    /// Partition names in stable order.
    pub fn partitions(&self) -> Vec<String> {
        (0..self.num_partitions()).map(|idx| format!("{}_{}", self.resource(), idx)).collect()
    }

    /// The operator-declared preference list for a partition (SEMI_AUTO).
    pub fn preference_list(&self, partition: &str) -> Option<&Vec<String>> {
        self.record.get_list(partition)
    }

    pub fn set_preference_list(&mut self, partition: impl Into<String>, instances: Vec<String>) {
        self.record.set_list(partition, instances);
    }

    /// The operator-declared instance→state map for a partition (CUSTOMIZED).
    pub fn instance_state_map(&self, partition: &str) -> Option<&BTreeMap<String, String>> {
        self.record.get_map(partition)
    }

    pub fn set_instance_state_map(&mut self, partition: impl Into<String>, map: BTreeMap<String, String>) {
        self.record.set_map(partition, map);
    }

    /// Validate the fields every mode requires. Returns a description of the
    /// first problem found, for admin-surface reporting.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_partitions() == 0 {
            return Err("NUM_PARTITIONS must be positive".into());
        }
        if self.state_model_def_ref().is_none() {
            return Err("STATE_MODEL_DEF_REF is required".into());
        }
        match self.rebalance_mode() {
            None => Err("REBALANCE_MODE missing or unknown".into()),
            Some(RebalanceMode::UserDefined) if self.rebalancer_name().is_none() => {
                Err("USER_DEFINED mode requires REBALANCER_NAME".into())
            }
            Some(_) => Ok(()),
        }
    }
}

/// Per-resource config overrides, consulted ahead of cluster-level defaults.
#[derive(Clone, Debug)]
pub struct ResourceConfig {
    record: Record,
}

impl ResourceConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        let mut record = Record::new(resource);
        record.set_bool(FIELD_RESOURCE_ENABLED, true);
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

    pub fn enabled(&self) -> bool {
        self.record.get_bool(FIELD_RESOURCE_ENABLED, true)
    }

    pub fn set_enabled(&mut self, val: bool) {
        self.record.set_bool(FIELD_RESOURCE_ENABLED, val);
    }

    /// Resource-scoped throttle overrides, same wire form as the cluster's.
    pub fn throttle_overrides(&self) -> Vec<super::ThrottleConfig> {
        self.record
            .get_list(FIELD_THROTTLE_OVERRIDES)
            .map(|raw| raw.iter().filter_map(|val| super::ThrottleConfig::decode(val)).collect())
            .unwrap_or_default()
    }

    pub fn set_throttle_overrides(&mut self, throttles: &[super::ThrottleConfig]) {
        self.record
            .set_list(FIELD_THROTTLE_OVERRIDES, throttles.iter().map(super::ThrottleConfig::encode).collect());
    }
}
