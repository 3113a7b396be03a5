//! The controller application object.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use meson_core::store::{StoreAdapter, StoreClient};

use crate::admin::ClusterAdmin;
use crate::config::Config;
use crate::monitor::ClusterStatusMonitor;
use crate::pipeline::ClusterController;
use crate::rebalancer::RebalancerRegistry;

/// The application object for a running Meson controller.
pub struct App {
    /// The application's runtime config.
    _config: Arc<Config>,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The join handle of the cluster controller.
    controller: JoinHandle<Result<()>>,
}

impl App {
    /// Create a new instance over the given store client.
    pub async fn new<C: StoreClient>(
        config: Arc<Config>, client: Arc<C>, registry: RebalancerRegistry, shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let adapter = StoreAdapter::new(client);

        // Record leadership before any write; election is external, this
        // controller must already have won it.
        let admin = ClusterAdmin::new(adapter.clone(), config.cluster.clone());
        admin
            .register_leader(&config.controller_name)
            .await
            .context("error registering controller leadership")?;

        let monitor = Arc::new(ClusterStatusMonitor::new(config.cluster.clone()));
        let controller =
            ClusterController::new(config.clone(), adapter, registry, monitor, shutdown_tx.subscribe()).spawn();

        Ok(Self {
            _config: config,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
            controller,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        tracing::debug!("Meson controller is shutting down");
        if let Err(err) = self.controller.await.context("error joining cluster controller handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down cluster controller");
        }

        tracing::debug!("Meson controller shutdown complete");
        Ok(())
    }
}
