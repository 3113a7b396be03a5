//! Cluster status monitoring.
//!
//! A single monitor object owned by the controller lifecycle. The pipeline
//! reports through the `StatusSink` trait rather than holding the monitor
//! directly, which keeps the dependency one-way.

use std::collections::HashSet;
use std::sync::Mutex;

/// Total pipeline runs completed.
const METRIC_PIPELINE_RUNS: &str = "meson_pipeline_runs";
/// Pipeline runs aborted before dispatch.
const METRIC_PIPELINE_ABORTS: &str = "meson_pipeline_aborts";
/// Duration of the last pipeline run in milliseconds.
const METRIC_PIPELINE_DURATION_MS: &str = "meson_pipeline_duration_ms";
/// Messages dispatched by the last pipeline run.
const METRIC_MESSAGES_DISPATCHED: &str = "meson_messages_dispatched";
/// Computed transitions rejected as illegal edges.
const METRIC_STATE_MODEL_VIOLATIONS: &str = "meson_state_model_violations";
/// Resources skipped for invalid config.
const METRIC_CONFIG_INVALID: &str = "meson_config_invalid_resources";
/// Partitions skipped for unrecognized reported states.
const METRIC_PARTITION_INPUT_FAULTS: &str = "meson_partition_input_faults";
/// Currently live participant instances.
const METRIC_LIVE_INSTANCES: &str = "meson_live_instances";
/// Outstanding state-transition messages observed cluster-wide.
const METRIC_PENDING_MESSAGES: &str = "meson_pending_messages";
/// Per-resource replica deficit vs the ideal replica count.
const METRIC_REPLICA_DEFICIT: &str = "meson_resource_replica_deficit";

/// The sink through which pipeline stages report cluster status.
pub trait StatusSink: Send + Sync {
    fn pipeline_run_complete(&self, duration_ms: u64, messages_dispatched: usize);
    fn pipeline_aborted(&self, reason: &str);
    fn state_model_violation(&self);
    fn config_invalid(&self, resource: &str);
    fn partition_input_fault(&self, resource: &str, partition: &str);
    fn set_live_instances(&self, count: usize);
    fn set_pending_messages(&self, count: usize);
    fn set_replica_deficit(&self, resource: &str, deficit: u32);
    /// Drop per-resource series for resources no longer present.
    fn retain_resources(&self, resources: &[&str]);
}

/// The controller's cluster status monitor.
pub struct ClusterStatusMonitor {
    cluster: String,
    /// Resources currently carrying registered per-resource series.
    tracked_resources: Mutex<HashSet<String>>,
}

impl ClusterStatusMonitor {
    pub fn new(cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        metrics::register_counter!(METRIC_PIPELINE_RUNS, metrics::Unit::Count, "total pipeline runs completed");
        metrics::register_counter!(METRIC_PIPELINE_ABORTS, metrics::Unit::Count, "pipeline runs aborted before dispatch");
        metrics::register_counter!(
            METRIC_STATE_MODEL_VIOLATIONS,
            metrics::Unit::Count,
            "computed transitions rejected as illegal state-model edges"
        );
        metrics::register_gauge!(METRIC_LIVE_INSTANCES, metrics::Unit::Count, "currently live participant instances");
        metrics::register_gauge!(METRIC_PENDING_MESSAGES, metrics::Unit::Count, "outstanding state-transition messages");
        Self { cluster, tracked_resources: Mutex::new(HashSet::new()) }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }
}

impl StatusSink for ClusterStatusMonitor {
    fn pipeline_run_complete(&self, duration_ms: u64, messages_dispatched: usize) {
        metrics::increment_counter!(METRIC_PIPELINE_RUNS);
        metrics::gauge!(METRIC_PIPELINE_DURATION_MS, duration_ms as f64);
        metrics::gauge!(METRIC_MESSAGES_DISPATCHED, messages_dispatched as f64);
    }

    fn pipeline_aborted(&self, reason: &str) {
        tracing::warn!(cluster = %self.cluster, reason, "pipeline run aborted");
        metrics::increment_counter!(METRIC_PIPELINE_ABORTS);
    }

    fn state_model_violation(&self) {
        metrics::increment_counter!(METRIC_STATE_MODEL_VIOLATIONS);
    }

    fn config_invalid(&self, resource: &str) {
        metrics::increment_counter!(METRIC_CONFIG_INVALID, "resource" => resource.to_string());
    }

    fn partition_input_fault(&self, resource: &str, partition: &str) {
        tracing::warn!(cluster = %self.cluster, resource, partition, "partition reported an unrecognized state");
        metrics::increment_counter!(METRIC_PARTITION_INPUT_FAULTS, "resource" => resource.to_string());
    }

    fn set_live_instances(&self, count: usize) {
        metrics::gauge!(METRIC_LIVE_INSTANCES, count as f64);
    }

    fn set_pending_messages(&self, count: usize) {
        metrics::gauge!(METRIC_PENDING_MESSAGES, count as f64);
    }

    fn set_replica_deficit(&self, resource: &str, deficit: u32) {
        self.tracked_resources.lock().expect("monitor lock poisoned").insert(resource.to_string());
        metrics::gauge!(METRIC_REPLICA_DEFICIT, deficit as f64, "resource" => resource.to_string());
    }

    fn retain_resources(&self, resources: &[&str]) {
        let mut tracked = self.tracked_resources.lock().expect("monitor lock poisoned");
        let gone: Vec<String> = tracked.iter().filter(|have| !resources.contains(&have.as_str())).cloned().collect();
        for resource in gone {
            // Zero the series; the exporter ages it out.
            metrics::gauge!(METRIC_REPLICA_DEFICIT, 0.0, "resource" => resource.clone());
            tracked.remove(&resource);
        }
    }
}

/// A sink which records nothing. Used by tests.
#[derive(Default)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn pipeline_run_complete(&self, _duration_ms: u64, _messages_dispatched: usize) {}
    fn pipeline_aborted(&self, _reason: &str) {}
    fn state_model_violation(&self) {}
    fn config_invalid(&self, _resource: &str) {}
    fn partition_input_fault(&self, _resource: &str, _partition: &str) {}
    fn set_live_instances(&self, _count: usize) {}
    fn set_pending_messages(&self, _count: usize) {}
    fn set_replica_deficit(&self, _resource: &str, _deficit: u32) {}
    fn retain_resources(&self, _resources: &[&str]) {}
}
