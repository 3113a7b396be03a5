//! External-view computation.
//!
//! Aggregates observed current states into the public per-resource view.
//! Within one run the computed views are monotonic with the observed
//! current state; across runs, temporary regressions are tolerated.

use meson_core::model::ExternalView;

use crate::cache::ClusterSnapshot;
use crate::stages::{CurrentStateOutput, ResourceMap};

/// The view records to write and the resources whose views to delete.
#[derive(Clone, Debug, Default)]
pub struct ExternalViewOutput {
    pub changed: Vec<ExternalView>,
    pub removed: Vec<String>,
}

pub fn compute_external_views(
    snapshot: &ClusterSnapshot, resources: &ResourceMap, current: &CurrentStateOutput,
) -> ExternalViewOutput {
    let mut output = ExternalViewOutput::default();
    for name in resources.keys() {
        let mut view = ExternalView::new(name.clone());
        for partition in current.mapped_partitions(name) {
            let state_map = current.current_state_map(name, &partition);
            if !state_map.is_empty() {
                view.set_state_map(partition, state_map);
            }
        }
        let unchanged = snapshot.external_views.get(name).map(|have| have == &view).unwrap_or(false);
        if !unchanged {
            output.changed.push(view);
        }
    }
    for name in snapshot.external_views.keys() {
        if !resources.contains_key(name) {
            output.removed.push(name.clone());
        }
    }
    output
}
