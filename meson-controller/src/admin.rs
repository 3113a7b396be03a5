//! The programmatic administrative surface.
//!
//! Creating a cluster materializes the store path skeleton; adding a
//! resource writes its IdealState and registers the state-model definition
//! if absent; enabling or disabling an instance toggles its config flag,
//! which the watching controller picks up as a pipeline trigger.

use anyhow::{bail, Context, Result};

use meson_core::keys;
use meson_core::model::{ClusterConfig, IdealState, InstanceConfig, StateModelDefinition};
use meson_core::record::Record;
use meson_core::store::{CreateMode, StoreAdapter, StoreClient};

pub struct ClusterAdmin<C: StoreClient> {
    adapter: StoreAdapter<C>,
    cluster: String,
}

impl<C: StoreClient> ClusterAdmin<C> {
    pub fn new(adapter: StoreAdapter<C>, cluster: impl Into<String>) -> Self {
        Self { adapter, cluster: cluster.into() }
    }

    /// Create the cluster skeleton, write its config, and register the
    /// built-in state models. Idempotent.
    pub async fn create_cluster(&self, config: &ClusterConfig) -> Result<()> {
        for path in keys::cluster_skeleton(&self.cluster) {
            self.adapter.ensure_path(&path).await.context("error creating cluster skeleton")?;
        }
        self.adapter
            .set_record(&keys::cluster_config(&self.cluster), config.record())
            .await
            .context("error writing cluster config")?;
        for smd in [StateModelDefinition::master_slave(), StateModelDefinition::online_offline()] {
            self.add_state_model(&smd).await?;
        }
        Ok(())
    }

    /// Register a state-model definition if absent. Definitions are
    /// immutable after registration; an existing one is left untouched.
    pub async fn add_state_model(&self, smd: &StateModelDefinition) -> Result<()> {
        let path = keys::state_model_def(&self.cluster, smd.name());
        if self.adapter.exists(&path).await.context("error checking state model")? {
            return Ok(());
        }
        self.adapter
            .create_record(&path, smd.record(), CreateMode::Persistent)
            .await
            .context("error registering state model")?;
        Ok(())
    }

    /// Add a resource. The referenced state model must already be
    /// registered, or be supplied alongside.
    pub async fn add_resource(&self, ideal_state: &IdealState, smd: Option<&StateModelDefinition>) -> Result<()> {
        if let Err(reason) = ideal_state.validate() {
            bail!("invalid ideal state for {}: {}", ideal_state.resource(), reason);
        }
        if let Some(smd) = smd {
            self.add_state_model(smd).await?;
        }
        let model = ideal_state.state_model_def_ref().unwrap_or_default();
        if !self.adapter.exists(&keys::state_model_def(&self.cluster, model)).await? {
            bail!("state model {} is not registered", model);
        }
        self.adapter
            .set_record(&keys::ideal_state(&self.cluster, ideal_state.resource()), ideal_state.record())
            .await
            .context("error writing ideal state")?;
        Ok(())
    }

    /// Drop a resource: remove its ideal state and external view. Live
    /// replicas are driven to DROPPED by subsequent pipeline runs.
    pub async fn drop_resource(&self, resource: &str) -> Result<()> {
        self.adapter.delete(&keys::ideal_state(&self.cluster, resource)).await?;
        self.adapter.delete(&keys::external_view(&self.cluster, resource)).await?;
        Ok(())
    }

    /// Add a participant instance's config.
    pub async fn add_instance(&self, config: &InstanceConfig) -> Result<()> {
        self.adapter
            .set_record(&keys::participant_config(&self.cluster, config.name()), config.record())
            .await
            .context("error writing instance config")?;
        Ok(())
    }

    /// Toggle an instance's enabled flag.
    pub async fn set_instance_enabled(&self, instance: &str, enabled: bool) -> Result<()> {
        let path = keys::participant_config(&self.cluster, instance);
        self.adapter
            .update(&path, move |record| {
                let mut config = match record {
                    Some(record) => InstanceConfig::from_record(record),
                    None => InstanceConfig::new(instance),
                };
                config.set_enabled(enabled);
                config.into_record()
            })
            .await
            .context("error toggling instance enabled flag")?;
        Ok(())
    }

    /// Register the elected controller's ephemeral leader marker. Election
    /// itself is external; this simply records the outcome.
    pub async fn register_leader(&self, controller: &str) -> Result<()> {
        let path = keys::controller_leader(&self.cluster);
        match self
            .adapter
            .create_record(&path, &Record::new(controller), CreateMode::Ephemeral)
            .await
        {
            Ok(_) => Ok(()),
            Err(meson_core::error::StoreError::NodeExists(_)) => {
                bail!("another controller already holds leadership for {}", self.cluster)
            }
            Err(err) => Err(err).context("error registering controller leader"),
        }
    }
}
