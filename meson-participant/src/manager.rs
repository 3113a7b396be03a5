//! The participant manager.
//!
//! Registers the instance as live under its store session, wires the
//! executor and message watcher, and tears the registration down on
//! graceful shutdown. The instance must already be configured in the
//! cluster by the admin surface; a participant never self-provisions.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use meson_core::keys;
use meson_core::model::LiveInstance;
use meson_core::store::{CreateMode, StoreAdapter, StoreClient};

use crate::config::Config;
use crate::executor::ParticipantExecutor;
use crate::state_model::StateModelRegistry;
use crate::watcher::MessageWatcher;

/// A running participant bound to one store session.
pub struct Participant<C: StoreClient> {
    config: Arc<Config>,
    adapter: StoreAdapter<C>,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The join handle of the message watcher.
    watcher: JoinHandle<Result<()>>,
}

impl<C: StoreClient> Participant<C> {
    /// Create a new instance and bring it online.
    pub async fn new(
        config: Arc<Config>, client: Arc<C>, registry: StateModelRegistry, shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let adapter = StoreAdapter::new(client);

        // The admin surface owns provisioning; refuse to run unconfigured.
        let config_path = keys::participant_config(&config.cluster, &config.instance);
        if !adapter.exists(&config_path).await.context("error checking instance config")? {
            bail!("instance {} is not configured in cluster {}", config.instance, config.cluster);
        }

        // Mark this instance live under the current session. The ephemeral
        // node is the liveness signal: the store removes it when the
        // session ends, however that happens.
        let live = LiveInstance::new(config.instance.clone(), adapter.session_id());
        adapter
            .create_record(
                &keys::live_instance(&config.cluster, &config.instance),
                live.record(),
                CreateMode::Ephemeral,
            )
            .await
            .context("error registering live instance")?;

        let executor = ParticipantExecutor::new(config.clone(), adapter.clone(), registry);
        let watcher = MessageWatcher::new(config.clone(), adapter.clone(), executor, shutdown_tx.subscribe()).spawn();

        tracing::info!(
            cluster = %config.cluster,
            instance = %config.instance,
            session = %adapter.session_id(),
            "participant is online",
        );
        Ok(Self {
            config,
            adapter,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
            watcher,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let _ = self.shutdown_rx.next().await;

        tracing::debug!(instance = %self.config.instance, "participant is shutting down");
        let _ = self.shutdown_tx.send(());
        if let Err(err) = self.watcher.await.context("error joining message watcher handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down message watcher");
        }

        // Remove the liveness marker eagerly rather than waiting for the
        // session to expire.
        if let Err(err) = self.adapter.delete(&keys::live_instance(&self.config.cluster, &self.config.instance)).await {
            tracing::error!(error = ?err, "error removing live instance marker");
        }

        tracing::debug!(instance = %self.config.instance, "participant shutdown complete");
        Ok(())
    }
}
