//! Message-queue watcher.
//!
//! Holds a child watch on the participant's inbound message directory and
//! feeds new messages to the executor. The executor is responsible for
//! ordering and deletion; the watcher only discovers ids.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, UnboundedReceiverStream};

use meson_core::error::StoreError;
use meson_core::keys;
use meson_core::model::Message;
use meson_core::store::{StoreAdapter, StoreClient, WatchEvent};
use meson_core::{ShutdownError, ShutdownResult};

use crate::config::Config;
use crate::executor::ParticipantExecutor;

/// A watcher of one participant's inbound message queue.
pub struct MessageWatcher<C: StoreClient> {
    config: Arc<Config>,
    adapter: StoreAdapter<C>,
    executor: Arc<ParticipantExecutor<C>>,
    /// Message ids already handed to the executor this session.
    seen: HashSet<String>,
    /// A channel used for triggering graceful shutdown.
    shutdown: BroadcastStream<()>,
}

impl<C: StoreClient> MessageWatcher<C> {
    pub fn new(
        config: Arc<Config>, adapter: StoreAdapter<C>, executor: Arc<ParticipantExecutor<C>>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            adapter,
            executor,
            seen: HashSet::new(),
            shutdown: BroadcastStream::new(shutdown),
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let dir = keys::messages(&self.config.cluster, &self.config.instance);
        self.adapter.ensure_path(&dir).await.context("error ensuring message queue path")?;
        let events = self.adapter.watch_children(&dir).await.context("error watching message queue")?;
        let mut events = UnboundedReceiverStream::new(events);

        tracing::info!(instance = %self.config.instance, "message watcher initialized");
        // Drain anything queued before the watch existed.
        self.drain(&dir).await?;

        loop {
            tokio::select! {
                Some(event) = events.next() => {
                    if matches!(event, WatchEvent::ChildrenChanged(_)) {
                        self.drain(&dir).await?;
                    }
                }
                _ = self.shutdown.next() => break,
            }
        }

        tracing::debug!(instance = %self.config.instance, "message watcher shutdown");
        Ok(())
    }

    /// Read the queue and submit every message not yet seen. Only a lost
    /// session is fatal; everything else waits for the next event.
    #[tracing::instrument(level = "trace", skip(self, dir))]
    async fn drain(&mut self, dir: &str) -> ShutdownResult<()> {
        let ids = match self.adapter.get_children(dir).await {
            Ok(ids) => ids,
            Err(err @ StoreError::SessionExpired) => {
                tracing::error!("store session expired, participant must restart");
                return Err(ShutdownError(err.into()));
            }
            Err(err) => {
                tracing::error!(error = %err, "error listing message queue");
                return Ok(());
            }
        };
        // Consumed ids never come back; stop tracking them.
        let listed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.seen.retain(|id| listed.contains(id.as_str()));

        for id in ids.iter() {
            if self.seen.contains(id) {
                continue;
            }
            let path = format!("{}/{}", dir, id);
            match self.adapter.get_record(&path).await {
                Ok(Some((record, _))) => {
                    self.seen.insert(id.clone());
                    self.executor.submit(Message::from_record(record));
                }
                // Consumed between list and read.
                Ok(None) => {}
                Err(err) => tracing::error!(error = %err, msg_id = %id, "error reading message"),
            }
        }
        Ok(())
    }
}
