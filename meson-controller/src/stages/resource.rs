//! Resource computation: enumerate resources & partitions from ideal states.

use std::collections::BTreeMap;

use meson_core::model::{IdealState, RebalanceMode};

use crate::cache::ClusterSnapshot;
use crate::monitor::StatusSink;

/// One resource as seen by the rest of the pipeline.
#[derive(Clone, Debug)]
pub struct Resource {
    pub name: String,
    pub state_model_def: String,
    pub rebalance_mode: RebalanceMode,
    pub partitions: Vec<String>,
    pub replicas: u32,
    pub ideal_state: IdealState,
}

/// Resources keyed by name, in stable order.
pub type ResourceMap = BTreeMap<String, Resource>;

/// Enumerate resources from the snapshot's ideal states.
///
/// Resources with invalid config, an unregistered state model, or a
/// disabling resource config are skipped and reported; the pipeline
/// continues without them.
pub fn compute_resources(snapshot: &ClusterSnapshot, sink: &dyn StatusSink) -> ResourceMap {
    let mut resources = ResourceMap::new();
    for (name, ideal_state) in &snapshot.ideal_states {
        if let Some(config) = snapshot.resource_configs.get(name) {
            if !config.enabled() {
                tracing::debug!(resource = %name, "resource is disabled, skipping");
                continue;
            }
        }
        if let Err(reason) = ideal_state.validate() {
            tracing::warn!(resource = %name, %reason, "invalid ideal state, skipping resource");
            sink.config_invalid(name);
            continue;
        }
        let state_model_def = ideal_state.state_model_def_ref().unwrap_or_default().to_string();
        if snapshot.state_model(&state_model_def).is_none() {
            tracing::warn!(resource = %name, state_model = %state_model_def, "state model not registered, skipping resource");
            sink.config_invalid(name);
            continue;
        }
        resources.insert(
            name.clone(),
            Resource {
                name: name.clone(),
                state_model_def,
                // Validated above.
                rebalance_mode: ideal_state.rebalance_mode().unwrap_or(RebalanceMode::SemiAuto),
                partitions: ideal_state.partitions(),
                replicas: ideal_state.replicas(),
                ideal_state: ideal_state.clone(),
            },
        );
    }
    resources
}
