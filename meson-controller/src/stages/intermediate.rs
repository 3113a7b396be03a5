//! Intermediate-state computation: the throttle & constraint engine.
//!
//! Takes the best-possible targets and emits the *next* legal step: a
//! per-partition instance→state map in which every change from current is a
//! single state-model edge, keeps every reachable intermediate configuration
//! within per-state upper bounds, and fits the configured throttle budgets.
//! Recovery partitions consume budget before load-balance partitions, in
//! deterministic (resource, partition) order.

use std::collections::{BTreeMap, HashMap};

use meson_core::model::{
    Message, RebalanceScope, StateModelDefinition, ThrottleConfig, ThrottleScope, ERROR_STATE,
};

use crate::cache::ClusterSnapshot;
use crate::monitor::StatusSink;
use crate::rebalancer::ResourceAssignment;
use crate::stages::{BestPossibleOutput, CurrentStateOutput, Resource, ResourceMap};

/// The classification of the work a transition performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BalanceKind {
    Recovery,
    Load,
}

/// Remaining budget at one throttle scope.
#[derive(Clone, Copy, Debug)]
struct Budget {
    recovery: Option<u32>,
    load: Option<u32>,
    any: Option<u32>,
}

impl Budget {
    /// Resolve the tightest configured cap per rebalance class at a scope.
    fn from_configs(configs: &[ThrottleConfig], scope: ThrottleScope) -> Self {
        let cap = |class: RebalanceScope| {
            configs
                .iter()
                .filter(|config| config.scope == scope && config.rebalance == class)
                .map(|config| config.max)
                .min()
        };
        Self {
            recovery: cap(RebalanceScope::RecoveryBalance),
            load: cap(RebalanceScope::LoadBalance),
            any: cap(RebalanceScope::Any),
        }
    }

    fn class_slot(&mut self, kind: BalanceKind) -> &mut Option<u32> {
        match kind {
            BalanceKind::Recovery => &mut self.recovery,
            BalanceKind::Load => &mut self.load,
        }
    }

    fn can_charge(&self, kind: BalanceKind) -> bool {
        let class = match kind {
            BalanceKind::Recovery => self.recovery,
            BalanceKind::Load => self.load,
        };
        class.map(|rem| rem > 0).unwrap_or(true) && self.any.map(|rem| rem > 0).unwrap_or(true)
    }

    /// Deduct one transition; saturates so recomputation of already
    /// in-flight work can never underflow.
    fn charge(&mut self, kind: BalanceKind) {
        if let Some(rem) = self.class_slot(kind).as_mut() {
            *rem = rem.saturating_sub(1);
        }
        if let Some(rem) = self.any.as_mut() {
            *rem = rem.saturating_sub(1);
        }
    }
}

/// Budgets across all three throttle scopes.
struct ThrottleLedger {
    cluster: Budget,
    resource_default: Budget,
    resources: HashMap<String, Budget>,
    instance_default: Budget,
    instances: HashMap<String, Budget>,
}

impl ThrottleLedger {
    fn new(snapshot: &ClusterSnapshot, resources: &ResourceMap) -> Self {
        let configs = snapshot.config.throttle_configs();
        let mut per_resource = HashMap::new();
        for name in resources.keys() {
            if let Some(config) = snapshot.resource_configs.get(name) {
                let overrides = config.throttle_overrides();
                if !overrides.is_empty() {
                    per_resource.insert(name.clone(), Budget::from_configs(&overrides, ThrottleScope::Resource));
                }
            }
        }
        Self {
            cluster: Budget::from_configs(&configs, ThrottleScope::Cluster),
            resource_default: Budget::from_configs(&configs, ThrottleScope::Resource),
            resources: per_resource,
            instance_default: Budget::from_configs(&configs, ThrottleScope::Instance),
            instances: HashMap::new(),
        }
    }

    fn resource_budget(&mut self, resource: &str) -> &mut Budget {
        let default = self.resource_default;
        self.resources.entry(resource.to_string()).or_insert(default)
    }

    fn instance_budget(&mut self, instance: &str) -> &mut Budget {
        let default = self.instance_default;
        self.instances.entry(instance.to_string()).or_insert(default)
    }

    /// Charge one transition against all three scopes, or none.
    fn try_charge(&mut self, resource: &str, instance: &str, kind: BalanceKind) -> bool {
        if !self.cluster.can_charge(kind)
            || !self.resource_budget(resource).can_charge(kind)
            || !self.instance_budget(instance).can_charge(kind)
        {
            return false;
        }
        self.cluster.charge(kind);
        self.resource_budget(resource).charge(kind);
        self.instance_budget(instance).charge(kind);
        true
    }

    /// Account for work already in flight; never blocks, only deducts.
    fn charge_pending(&mut self, resource: &str, instance: &str, kind: BalanceKind) {
        self.cluster.charge(kind);
        self.resource_budget(resource).charge(kind);
        self.instance_budget(instance).charge(kind);
    }
}

/// The throttled next step toward best-possible.
#[derive(Clone, Debug, Default)]
pub struct IntermediateOutput {
    map: BTreeMap<String, ResourceAssignment>,
    /// Pending messages superseded by a changed target, to be cancelled.
    cancellations: Vec<Message>,
    /// Partitions skipped because a replica reported an unknown state.
    skipped: Vec<(String, String)>,
}

impl IntermediateOutput {
    pub fn partition_map(&self, resource: &str, partition: &str) -> Option<&BTreeMap<String, String>> {
        self.map.get(resource).and_then(|assignment| assignment.get(partition))
    }

    pub fn resources(&self) -> impl Iterator<Item = (&String, &ResourceAssignment)> {
        self.map.iter()
    }

    pub fn cancellations(&self) -> &[Message] {
        &self.cancellations
    }

    pub fn skipped_partitions(&self) -> &[(String, String)] {
        &self.skipped
    }

    #[cfg(test)]
    pub(crate) fn insert_step_for_test(&mut self, resource: &str, partition: &str, step: BTreeMap<String, String>) {
        self.map.entry(resource.to_string()).or_default().insert(partition.to_string(), step);
    }
}

/// Classify a partition: recovery when the top state is under-replicated,
/// the active replica floor is broken, or any replica sits in ERROR.
fn classify(
    smd: &StateModelDefinition, resource: &Resource, current_map: &BTreeMap<String, String>, num_live: u32,
) -> BalanceKind {
    if current_map.values().any(|state| state == ERROR_STATE) {
        return BalanceKind::Recovery;
    }
    if let Some(top) = smd.top_state() {
        let required = smd
            .state_upper_bound(top, num_live, resource.replicas)
            .unwrap_or(resource.replicas)
            .min(resource.replicas);
        let have = current_map.values().filter(|state| state.as_str() == top).count() as u32;
        if have < required {
            return BalanceKind::Recovery;
        }
    }
    if let Some(min_active) = resource.ideal_state.min_active_replicas() {
        let initial_rank = smd.state_priority(smd.initial_state());
        let active = current_map
            .values()
            .filter(|state| smd.state_priority(state) < initial_rank && state.as_str() != ERROR_STATE)
            .count() as u32;
        if active < min_active {
            return BalanceKind::Recovery;
        }
    }
    BalanceKind::Load
}

/// Compute the intermediate step for every resource.
pub fn compute_intermediate(
    snapshot: &ClusterSnapshot, resources: &ResourceMap, current: &CurrentStateOutput, best: &BestPossibleOutput,
    controller: &str, sink: &dyn StatusSink,
) -> IntermediateOutput {
    let mut output = IntermediateOutput::default();
    let mut ledger = ThrottleLedger::new(snapshot, resources);
    let num_live = snapshot.live_instances.len() as u32;
    let cancellation_enabled = snapshot.config.transition_cancellation_enabled();

    // Classify every partition up front, and account for transitions already
    // in flight before handing out fresh budget.
    let mut entries: Vec<(&Resource, &String, BalanceKind)> = Vec::new();
    for (name, resource) in resources {
        let smd = match snapshot.state_model(&resource.state_model_def) {
            Some(smd) => smd,
            None => continue,
        };
        for partition in &resource.partitions {
            let current_map = current.current_state_map(name, partition);
            let kind = classify(smd, resource, &current_map, num_live);
            for instance in current.pending_message_map(name, partition).keys() {
                ledger.charge_pending(name, instance, kind);
            }
            entries.push((resource, partition, kind));
        }
    }
    entries.sort_by_key(|(resource, partition, kind)| {
        (*kind == BalanceKind::Load, resource.name.clone(), (*partition).clone())
    });

    for (resource, partition, kind) in entries {
        let name = &resource.name;
        let smd = match snapshot.state_model(&resource.state_model_def) {
            Some(smd) => smd,
            None => continue,
        };
        let current_map = current.current_state_map(name, partition);
        let pending_map = current.pending_message_map(name, partition);
        let empty = BTreeMap::new();
        let target_map = best.partition_map(name, partition).unwrap_or(&empty);

        // A replica reporting a state outside the model poisons the whole
        // partition: freeze it and let the rest of the pipeline continue.
        if let Some((instance, state)) = current_map.iter().find(|(_, state)| !smd.contains_state(state)) {
            tracing::warn!(
                resource = %name, partition = %partition, instance = %instance, state = %state,
                "replica reports a state unknown to the state model, freezing partition"
            );
            sink.partition_input_fault(name, partition);
            output.skipped.push((name.clone(), partition.clone()));
            output
                .map
                .entry(name.clone())
                .or_default()
                .insert(partition.clone(), current_map.clone());
            continue;
        }

        // Supersession: a pending transition is kept only while it is still
        // the hop the target calls for; anything else gets a cancellation,
        // budget permitting. The pending message and its cancellation both
        // count until observed complete.
        if cancellation_enabled {
            for (instance, msg) in &pending_map {
                let eff_current = current_map
                    .get(instance)
                    .map(String::as_str)
                    .unwrap_or_else(|| smd.initial_state());
                let keep = match target_map.get(instance) {
                    Some(desired) => {
                        desired.as_str() == msg.to_state()
                            || smd.next_state(eff_current, desired).as_deref() == Some(msg.to_state())
                    }
                    None => false,
                };
                if !keep
                    && current.pending_cancellation(name, partition, instance).is_none()
                    && ledger.try_charge(name, instance, kind)
                {
                    output.cancellations.push(Message::new_cancellation(controller, msg));
                }
            }
        }

        // Occupancy per state: holders' current states plus in-flight
        // to-states, so bounds hold across every reachable interleaving.
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for state in current_map.values() {
            *counts.entry(state.clone()).or_insert(0) += 1;
        }
        for msg in pending_map.values() {
            *counts.entry(msg.to_state().to_string()).or_insert(0) += 1;
        }

        // Candidate single-hop transitions toward the target.
        let mut candidates: Vec<(String, String, String)> = Vec::new();
        for (instance, desired) in target_map {
            if pending_map.contains_key(instance) {
                continue;
            }
            let eff_current = current_map
                .get(instance)
                .map(String::as_str)
                .unwrap_or_else(|| smd.initial_state());
            if eff_current == desired.as_str() {
                continue;
            }
            match smd.next_state(eff_current, desired) {
                Some(next) => candidates.push((instance.clone(), eff_current.to_string(), next)),
                None => {
                    tracing::warn!(
                        resource = %name, partition = %partition, instance = %instance,
                        from = %eff_current, to = %desired,
                        "no transition path in state model, skipping replica"
                    );
                }
            }
        }
        candidates.sort_by_key(|(instance, from, to)| (smd.transition_priority(from, to), instance.clone()));

        let mut step: BTreeMap<String, String> = current_map.clone();
        for (instance, _from, to) in candidates {
            if let Some(bound) = smd.state_upper_bound(&to, num_live, resource.replicas) {
                if counts.get(&to).copied().unwrap_or(0) + 1 > bound {
                    continue;
                }
            }
            if !ledger.try_charge(name, &instance, kind) {
                continue;
            }
            *counts.entry(to.clone()).or_insert(0) += 1;
            step.insert(instance, to);
        }
        output.map.entry(name.clone()).or_default().insert(partition.clone(), step);
    }

    output
}
