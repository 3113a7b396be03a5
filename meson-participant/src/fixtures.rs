//! Shared test fixtures for the participant crate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use meson_core::keys;
use meson_core::model::{CurrentState, InstanceConfig, Message, StateModelDefinition};
use meson_core::store::{MemoryClient, MemoryStore, StoreAdapter};

use crate::state_model::{StateModel, StateModelFactory};

/// Seed the store with the cluster layout a participant needs: the
/// MasterSlave definition, the instance's config, and its queue directory.
pub async fn seed_cluster(store: &MemoryStore, cluster: &str, instance: &str) -> Result<StoreAdapter<MemoryClient>> {
    let adapter = StoreAdapter::new(Arc::new(store.connect()));
    let smd = StateModelDefinition::master_slave();
    adapter
        .set_record(&keys::state_model_def(cluster, smd.name()), smd.record())
        .await?;
    adapter
        .set_record(&keys::participant_config(cluster, instance), InstanceConfig::new(instance).record())
        .await?;
    adapter.ensure_path(&keys::messages(cluster, instance)).await?;
    adapter.ensure_path(&keys::current_states(cluster, instance)).await?;
    Ok(adapter)
}

/// Create a transition message in the instance's queue.
pub async fn queue_message(
    adapter: &StoreAdapter<MemoryClient>, cluster: &str, instance: &str, session: &str, resource: &str,
    partition: &str, from: &str, to: &str,
) -> Result<Message> {
    let msg =
        Message::new_state_transition("controller-0", instance, session, resource, partition, "MasterSlave", from, to);
    adapter
        .set_record(&keys::message(cluster, instance, msg.id()), msg.record())
        .await?;
    Ok(msg)
}

/// Poll until the replica reports the expected state, or time out.
pub async fn await_state(
    adapter: &StoreAdapter<MemoryClient>, cluster: &str, instance: &str, session: &str, resource: &str,
    partition: &str, expected: Option<&str>,
) -> Result<()> {
    let path = keys::current_state(cluster, instance, session, resource);
    for _ in 0..200 {
        let have = match adapter.get_record(&path).await? {
            Some((record, _)) => CurrentState::from_record(record).state(partition).map(str::to_string),
            None => None,
        };
        if have.as_deref() == expected {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("replica {}/{} never reached {:?}", resource, partition, expected)
}

/// Poll until the message id disappears from the instance's queue.
pub async fn await_message_gone(
    adapter: &StoreAdapter<MemoryClient>, cluster: &str, instance: &str, msg_id: &str,
) -> Result<()> {
    let path = keys::message(cluster, instance, msg_id);
    for _ in 0..200 {
        if !adapter.exists(&path).await? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("message {} was never consumed", msg_id)
}

/// A transition invocation observed by the recording model.
pub type TransitionLog = Arc<Mutex<Vec<(String, String, String)>>>;

/// A state model which records invocations, and can be told to fail or
/// stall for specific partitions.
pub struct RecordingModel {
    partition: String,
    log: TransitionLog,
    fail_partitions: HashSet<String>,
    delay: Duration,
}

#[async_trait]
impl StateModel for RecordingModel {
    async fn on_transition(&mut self, from: &str, to: &str, _msg: &Message) -> Result<Option<String>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log
            .lock()
            .await
            .push((self.partition.clone(), from.to_string(), to.to_string()));
        if self.fail_partitions.contains(&self.partition) {
            bail!("induced handler failure for {}", self.partition);
        }
        Ok(Some(format!("{}->{}", from, to)))
    }
}

/// Factory for [`RecordingModel`] handlers.
#[derive(Default)]
pub struct RecordingFactory {
    pub log: TransitionLog,
    pub fail_partitions: HashSet<String>,
    pub delay: Duration,
}

impl StateModelFactory for RecordingFactory {
    fn create(&self, _resource: &str, partition: &str) -> Box<dyn StateModel> {
        Box::new(RecordingModel {
            partition: partition.to_string(),
            log: self.log.clone(),
            fail_partitions: self.fail_partitions.clone(),
            delay: self.delay,
        })
    }
}
