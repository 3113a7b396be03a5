//! Shared test fixtures for the controller crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use meson_core::keys;
use meson_core::model::{
    ClusterConfig, CurrentState, IdealState, InstanceConfig, LiveInstance, Message, MessageType, RebalanceMode,
    StateModelDefinition, DROPPED_STATE,
};
use meson_core::store::{CreateMode, MemoryClient, MemoryStore, StoreAdapter, StoreClient};

use crate::admin::ClusterAdmin;
use crate::cache::ClusterSnapshot;
use crate::monitor::NullSink;
use crate::pipeline::PipelineRunner;
use crate::rebalancer::RebalancerRegistry;

pub const CONTROLLER: &str = "controller-0";

/// Create a cluster skeleton + config in a fresh store, returning the
/// controller-side adapter.
pub async fn setup_cluster(store: &MemoryStore, cluster: &str, config: ClusterConfig) -> Result<StoreAdapter<MemoryClient>> {
    let adapter = StoreAdapter::new(Arc::new(store.connect()));
    let admin = ClusterAdmin::new(adapter.clone(), cluster);
    admin.create_cluster(&config).await?;
    admin.register_leader(CONTROLLER).await?;
    Ok(adapter)
}

/// Build a pipeline runner over the given adapter.
pub fn runner(adapter: StoreAdapter<MemoryClient>, cluster: &str) -> PipelineRunner<MemoryClient> {
    PipelineRunner::new(adapter, cluster, CONTROLLER, RebalancerRegistry::new(), Arc::new(NullSink))
}

/// Add an instance config and bring the instance online under a fresh
/// session. Returns the participant's store client.
pub async fn join_instance(store: &MemoryStore, cluster: &str, name: &str) -> Result<MemoryClient> {
    let client = store.connect();
    let adapter = StoreAdapter::new(Arc::new(store.connect()));
    ClusterAdmin::new(adapter.clone(), cluster).add_instance(&InstanceConfig::new(name)).await?;
    let live = LiveInstance::new(name, client.session_id());
    client
        .create(&keys::live_instance(cluster, name), live.record().to_bytes(), CreateMode::Ephemeral)
        .await
        .context("error creating live instance marker")?;
    Ok(client)
}

/// Build a SEMI_AUTO ideal state with the same preference list per partition.
pub fn semi_auto_ideal_state(resource: &str, partitions: u32, replicas: u32, preference: &[&str]) -> IdealState {
    let mut ideal = IdealState::new(resource);
    ideal.set_num_partitions(partitions);
    ideal.set_replicas(replicas);
    ideal.set_rebalance_mode(RebalanceMode::SemiAuto);
    ideal.set_state_model_def_ref("MasterSlave");
    for partition in ideal.partitions() {
        ideal.set_preference_list(partition, preference.iter().map(|have| have.to_string()).collect());
    }
    ideal
}

/// Build a FULL_AUTO ideal state.
pub fn full_auto_ideal_state(resource: &str, partitions: u32, replicas: u32, model: &str) -> IdealState {
    let mut ideal = IdealState::new(resource);
    ideal.set_num_partitions(partitions);
    ideal.set_replicas(replicas);
    ideal.set_rebalance_mode(RebalanceMode::FullAuto);
    ideal.set_state_model_def_ref(model);
    ideal
}

/// All state-transition messages currently queued for an instance.
pub async fn queued_messages(adapter: &StoreAdapter<MemoryClient>, cluster: &str, instance: &str) -> Result<Vec<Message>> {
    let dir = keys::messages(cluster, instance);
    let mut queue = Vec::new();
    for child in adapter.get_children(&dir).await? {
        if let Some((record, _)) = adapter.get_record(&format!("{}/{}", dir, child)).await? {
            queue.push(Message::from_record(record));
        }
    }
    queue.sort_by_key(|msg| (msg.partition().to_string(), msg.tgt_name().to_string()));
    Ok(queue)
}

/// Apply every queued state-transition message the way a healthy
/// participant would: write the new state, clear the requested state,
/// delete the message. Returns how many were applied.
pub async fn apply_transition_messages(adapter: &StoreAdapter<MemoryClient>, cluster: &str) -> Result<usize> {
    let mut applied = 0;
    for instance in adapter.get_children(&keys::instances(cluster)).await? {
        for msg in queued_messages(adapter, cluster, &instance).await? {
            if msg.msg_type() != Some(MessageType::StateTransition) {
                adapter.delete(&keys::message(cluster, &instance, msg.id())).await?;
                continue;
            }
            let path = keys::current_state(cluster, &instance, msg.tgt_session_id(), msg.resource());
            let (resource, session, model) =
                (msg.resource().to_string(), msg.tgt_session_id().to_string(), msg.state_model_def().to_string());
            let (partition, to_state) = (msg.partition().to_string(), msg.to_state().to_string());
            adapter
                .update(&path, move |record| {
                    let mut state = match record {
                        Some(record) => CurrentState::from_record(record),
                        None => CurrentState::new(resource.clone(), session.clone(), model.clone()),
                    };
                    if to_state == DROPPED_STATE {
                        state.remove_partition(&partition);
                    } else {
                        state.set_state(&partition, to_state.clone());
                        state.clear_requested_state(&partition);
                    }
                    state.into_record()
                })
                .await?;
            adapter.delete(&keys::message(cluster, &instance, msg.id())).await?;
            applied += 1;
        }
    }
    Ok(applied)
}

/// Report a state directly into an instance's current-state record,
/// bypassing the message flow. Used to seed odd states.
pub async fn report_state(
    adapter: &StoreAdapter<MemoryClient>, cluster: &str, instance: &str, session: &str, resource: &str,
    partition: &str, state: &str,
) -> Result<()> {
    let path = keys::current_state(cluster, instance, session, resource);
    let (resource, session, partition, state) =
        (resource.to_string(), session.to_string(), partition.to_string(), state.to_string());
    adapter
        .update(&path, move |record| {
            let mut current = match record {
                Some(record) => CurrentState::from_record(record),
                None => CurrentState::new(resource.clone(), session.clone(), "MasterSlave"),
            };
            current.set_state(&partition, state.clone());
            current.into_record()
        })
        .await?;
    Ok(())
}

/// A hand-built snapshot for stage-level tests.
pub fn empty_snapshot(cluster: &str) -> ClusterSnapshot {
    let mut state_model_defs = BTreeMap::new();
    for smd in [StateModelDefinition::master_slave(), StateModelDefinition::online_offline()] {
        state_model_defs.insert(smd.name().to_string(), smd);
    }
    ClusterSnapshot {
        cluster: cluster.to_string(),
        config: ClusterConfig::new(cluster),
        resource_configs: BTreeMap::new(),
        instance_configs: BTreeMap::new(),
        live_instances: BTreeMap::new(),
        ideal_states: BTreeMap::new(),
        state_model_defs,
        current_states: BTreeMap::new(),
        messages: BTreeMap::new(),
        external_views: BTreeMap::new(),
        stale_sessions: Vec::new(),
        offline_since: BTreeMap::new(),
        captured_at_ms: Utc::now().timestamp_millis(),
    }
}

/// Add a live, enabled instance to a hand-built snapshot.
pub fn snapshot_instance(snapshot: &mut ClusterSnapshot, name: &str) {
    snapshot.instance_configs.insert(name.to_string(), InstanceConfig::new(name));
    snapshot
        .live_instances
        .insert(name.to_string(), LiveInstance::new(name, format!("session-{}", name)));
    snapshot.current_states.entry(name.to_string()).or_default();
    snapshot.messages.entry(name.to_string()).or_default();
}

/// Record a reported state in a hand-built snapshot.
pub fn snapshot_state(
    snapshot: &mut ClusterSnapshot, instance: &str, resource: &str, model: &str, partition: &str, state: &str,
) {
    let session = snapshot.session_of(instance).unwrap_or_default().to_string();
    let states = snapshot.current_states.entry(instance.to_string()).or_default();
    let record = states
        .entry(resource.to_string())
        .or_insert_with(|| CurrentState::new(resource, session, model));
    record.set_state(partition, state);
}
