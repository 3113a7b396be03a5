//! Cluster-level configuration.

use serde::{Deserialize, Serialize};

use crate::record::Record;

const FIELD_TOPOLOGY_PATH: &str = "TOPOLOGY_PATH";
const FIELD_FAULT_ZONE_TYPE: &str = "FAULT_ZONE_TYPE";
const FIELD_PERSIST_BEST_POSSIBLE: &str = "PERSIST_BEST_POSSIBLE_ASSIGNMENT";
const FIELD_PERSIST_INTERMEDIATE: &str = "PERSIST_INTERMEDIATE_ASSIGNMENT";
const FIELD_PIPELINE_DISABLED: &str = "PIPELINE_DISABLED";
const FIELD_DELAY_REBALANCE_DISABLED: &str = "DELAY_REBALANCE_DISABLED";
const FIELD_DELAY_REBALANCE_TIME: &str = "DELAY_REBALANCE_TIME";
const FIELD_TRANSITION_CANCELLATION: &str = "STATE_TRANSITION_CANCELLATION_ENABLED";
const FIELD_THROTTLES: &str = "STATE_TRANSITION_THROTTLE_CONFIGS";

/// The scope at which a throttle cap applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ThrottleScope {
    Cluster,
    Resource,
    Instance,
}

/// The class of rebalance work a throttle cap applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RebalanceScope {
    RecoveryBalance,
    LoadBalance,
    Any,
}

/// A configured cap on concurrent in-flight state transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ThrottleConfig {
    pub scope: ThrottleScope,
    pub rebalance: RebalanceScope,
    pub max: u32,
}

impl ThrottleConfig {
    /// Encode as the `SCOPE/REBALANCE/MAX` form used in the config record.
    pub(crate) fn encode(&self) -> String {
        let scope = match self.scope {
            ThrottleScope::Cluster => "CLUSTER",
            ThrottleScope::Resource => "RESOURCE",
            ThrottleScope::Instance => "INSTANCE",
        };
        let rebalance = match self.rebalance {
            RebalanceScope::RecoveryBalance => "RECOVERY_BALANCE",
            RebalanceScope::LoadBalance => "LOAD_BALANCE",
            RebalanceScope::Any => "ANY",
        };
        format!("{}/{}/{}", scope, rebalance, self.max)
    }

    /// Decode from the `SCOPE/REBALANCE/MAX` form, `None` on malformed input.
    pub(crate) fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.split('/');
        let scope = match parts.next()? {
            "CLUSTER" => ThrottleScope::Cluster,
            "RESOURCE" => ThrottleScope::Resource,
            "INSTANCE" => ThrottleScope::Instance,
            _ => return None,
        };
        let rebalance = match parts.next()? {
            "RECOVERY_BALANCE" => RebalanceScope::RecoveryBalance,
            "LOAD_BALANCE" => RebalanceScope::LoadBalance,
            "ANY" => RebalanceScope::Any,
            _ => return None,
        };
        let max = parts.next()?.parse().ok()?;
        Some(Self { scope, rebalance, max })
    }
}

/// The cluster config record, created at cluster setup and mutated by admin.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    record: Record,
}

impl ClusterConfig {
    /// Create a new config for the given cluster with defaults.
    pub fn new(cluster: impl Into<String>) -> Self {
        Self { record: Record::new(cluster) }
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

    /// The cluster name.
    pub fn name(&self) -> &str {
        &self.record.id
    }

    /// The topology path declaring the fault-zone hierarchy, eg `/zone/host`.
    pub fn topology_path(&self) -> Option<&str> {
        self.record.get_simple(FIELD_TOPOLOGY_PATH)
    }

    pub fn set_topology_path(&mut self, path: impl Into<String>) {
        self.record.set_simple(FIELD_TOPOLOGY_PATH, path);
    }

    /// The topology element across which replicas must be spread.
    pub fn fault_zone_type(&self) -> Option<&str> {
        self.record.get_simple(FIELD_FAULT_ZONE_TYPE)
    }

    pub fn set_fault_zone_type(&mut self, zone: impl Into<String>) {
        self.record.set_simple(FIELD_FAULT_ZONE_TYPE, zone);
    }

    pub fn persist_best_possible(&self) -> bool {
        self.record.get_bool(FIELD_PERSIST_BEST_POSSIBLE, false)
    }

    pub fn set_persist_best_possible(&mut self, val: bool) {
        self.record.set_bool(FIELD_PERSIST_BEST_POSSIBLE, val);
    }

    pub fn persist_intermediate(&self) -> bool {
        self.record.get_bool(FIELD_PERSIST_INTERMEDIATE, false)
    }

    pub fn set_persist_intermediate(&mut self, val: bool) {
        self.record.set_bool(FIELD_PERSIST_INTERMEDIATE, val);
    }

    /// Whether the controller pipeline is administratively disabled.
    pub fn pipeline_disabled(&self) -> bool {
        self.record.get_bool(FIELD_PIPELINE_DISABLED, false)
    }

    pub fn set_pipeline_disabled(&mut self, val: bool) {
        self.record.set_bool(FIELD_PIPELINE_DISABLED, val);
    }

    pub fn delay_rebalance_disabled(&self) -> bool {
        self.record.get_bool(FIELD_DELAY_REBALANCE_DISABLED, false)
    }

    pub fn set_delay_rebalance_disabled(&mut self, val: bool) {
        self.record.set_bool(FIELD_DELAY_REBALANCE_DISABLED, val);
    }

    /// Milliseconds for which a departed instance is still treated as live by
    /// the rebalancers. `0` disables the delay.
    pub fn delay_rebalance_ms(&self) -> i64 {
        if self.delay_rebalance_disabled() {
            return 0;
        }
        self.record.get_i64(FIELD_DELAY_REBALANCE_TIME).unwrap_or(0)
    }

    pub fn set_delay_rebalance_ms(&mut self, millis: i64) {
        self.record.set_i64(FIELD_DELAY_REBALANCE_TIME, millis);
    }

    /// Whether superseded pending transitions may be cancelled.
    pub fn transition_cancellation_enabled(&self) -> bool {
        self.record.get_bool(FIELD_TRANSITION_CANCELLATION, false)
    }

    pub fn set_transition_cancellation_enabled(&mut self, val: bool) {
        self.record.set_bool(FIELD_TRANSITION_CANCELLATION, val);
    }

    /// All configured state-transition throttles. Malformed entries are dropped.
    pub fn throttle_configs(&self) -> Vec<ThrottleConfig> {
        self.record
            .get_list(FIELD_THROTTLES)
            .map(|raw| raw.iter().filter_map(|val| ThrottleConfig::decode(val)).collect())
            .unwrap_or_default()
    }

    pub fn set_throttle_configs(&mut self, throttles: &[ThrottleConfig]) {
        self.record
            .set_list(FIELD_THROTTLES, throttles.iter().map(ThrottleConfig::encode).collect());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_configs_round_trip_and_skip_malformed() {
        let mut config = ClusterConfig::new("alpha");
        config.set_throttle_configs(&[
            ThrottleConfig { scope: ThrottleScope::Cluster, rebalance: RebalanceScope::Any, max: 10 },
            ThrottleConfig { scope: ThrottleScope::Instance, rebalance: RebalanceScope::RecoveryBalance, max: 2 },
        ]);
        config.record.list_fields.get_mut(FIELD_THROTTLES).unwrap().push("BOGUS".into());

        let parsed = config.throttle_configs();
        assert_eq!(parsed.len(), 2, "expected 2 throttles got {}", parsed.len());
        assert_eq!(parsed[1].max, 2);
    }

    #[test]
    fn delay_rebalance_zero_when_disabled() {
        let mut config = ClusterConfig::new("alpha");
        config.set_delay_rebalance_ms(30_000);
        assert_eq!(config.delay_rebalance_ms(), 30_000);
        config.set_delay_rebalance_disabled(true);
        assert_eq!(config.delay_rebalance_ms(), 0);
    }
}
