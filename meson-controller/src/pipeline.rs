//! The controller pipeline.
//!
//! `PipelineRunner::run_once` executes the staged computation against one
//! immutable snapshot: resources → current state → best possible →
//! intermediate → message generation → selection → dispatch → external
//! views → GC. `ClusterController` is the actor that owns a runner, holds
//! watches on the store, and re-runs the pipeline on events, on a periodic
//! timer, and at delayed-rebalance expiries. Triggers arriving while a run
//! is active coalesce into a single follow-up run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

use meson_core::error::StoreError;
use meson_core::keys;
use meson_core::model::{DROPPED_STATE, ERROR_STATE};
use meson_core::store::{StoreAdapter, StoreClient};

use crate::cache::{ClusterDataCache, ClusterSnapshot};
use crate::config::Config;
use crate::dispatch::{self, DispatchOutcome};
use crate::gc;
use crate::monitor::StatusSink;
use crate::rebalancer::RebalancerRegistry;
use crate::stages;

/// Failures which abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required subtree failed to load; no side effects were produced.
    #[error("snapshot incomplete: {0:#}")]
    SnapshotIncomplete(anyhow::Error),
    /// A computed transition is not an edge of the state model. This is a
    /// controller bug, never an input fault; nothing is dispatched.
    #[error("computed transition {from}->{to} for {resource}/{partition} is not a state-model edge")]
    StateModelViolation { resource: String, partition: String, from: String, to: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What one pipeline run did.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOutcome {
    pub messages_dispatched: usize,
    pub cancellations: usize,
    /// Whether dispatch was abandoned on a conflict.
    pub abandoned: bool,
    /// The next delayed-rebalance expiry, when one is pending.
    pub next_wakeup_ms: Option<i64>,
}

/// Executes pipeline runs. One runner per elected controller per cluster;
/// runs never overlap.
pub struct PipelineRunner<C: StoreClient> {
    adapter: StoreAdapter<C>,
    controller: String,
    cache: ClusterDataCache<C>,
    registry: RebalancerRegistry,
    sink: Arc<dyn StatusSink>,
}

impl<C: StoreClient> PipelineRunner<C> {
    pub fn new(
        adapter: StoreAdapter<C>, cluster: impl Into<String>, controller: impl Into<String>,
        registry: RebalancerRegistry, sink: Arc<dyn StatusSink>,
    ) -> Self {
        let cluster = cluster.into();
        Self {
            cache: ClusterDataCache::new(adapter.clone(), cluster),
            adapter,
            controller: controller.into(),
            registry,
            sink,
        }
    }

    pub fn cache(&self) -> &ClusterDataCache<C> {
        &self.cache
    }

    /// Execute one full pipeline run against a fresh snapshot.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_once(&mut self) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        let snapshot = match self.cache.refresh().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.sink.pipeline_aborted("snapshot incomplete");
                return Err(PipelineError::SnapshotIncomplete(err));
            }
        };
        self.sink.set_live_instances(snapshot.live_instances.len());
        if snapshot.config.pipeline_disabled() {
            tracing::debug!(cluster = %snapshot.cluster, "pipeline is disabled, skipping run");
            return Ok(RunOutcome::default());
        }

        let resources = stages::compute_resources(&snapshot, self.sink.as_ref());
        let current = stages::compute_current_state(&snapshot);
        self.sink.set_pending_messages(current.pending_count());

        let best = stages::compute_best_possible(&snapshot, &resources, &current, &self.registry, self.sink.as_ref());
        let intermediate =
            stages::compute_intermediate(&snapshot, &resources, &current, &best, &self.controller, self.sink.as_ref());

        let generated =
            match stages::generate_messages(&snapshot, &resources, &current, &intermediate, &self.controller) {
                Ok(generated) => generated,
                Err(err) => {
                    self.sink.state_model_violation();
                    self.sink.pipeline_aborted("state model violation");
                    return Err(err);
                }
            };
        let cancellations = intermediate.cancellations().to_vec();
        let cancellation_count = cancellations.len();
        let selected = stages::select_messages(&snapshot, &resources, generated, cancellations);

        let DispatchOutcome { dispatched, abandoned } =
            dispatch::dispatch_messages(&self.adapter, &snapshot, &selected, &self.controller).await?;
        if abandoned {
            self.sink.pipeline_aborted("dispatch abandoned on conflict");
        }

        self.apply_external_views(&snapshot, &resources, &current).await?;
        self.persist_assignments(&snapshot, &best, &intermediate).await;
        gc::collect_stale_sessions(&self.adapter, &snapshot).await?;
        self.report_deficits(&snapshot, &resources, &current);

        let outcome = RunOutcome {
            messages_dispatched: dispatched,
            cancellations: cancellation_count,
            abandoned,
            next_wakeup_ms: snapshot.earliest_delay_expiry_ms(),
        };
        self.sink
            .pipeline_run_complete(started.elapsed().as_millis() as u64, outcome.messages_dispatched);
        tracing::debug!(
            cluster = %snapshot.cluster,
            dispatched = outcome.messages_dispatched,
            cancellations = outcome.cancellations,
            abandoned = outcome.abandoned,
            "pipeline run complete"
        );
        Ok(outcome)
    }

    /// Write changed external views and delete views of dropped resources.
    async fn apply_external_views(
        &self, snapshot: &ClusterSnapshot, resources: &stages::ResourceMap, current: &stages::CurrentStateOutput,
    ) -> Result<(), PipelineError> {
        let views = stages::compute_external_views(snapshot, resources, current);
        let items: Vec<(String, meson_core::record::Record)> = views
            .changed
            .into_iter()
            .map(|view| (keys::external_view(&snapshot.cluster, view.resource()), view.into_record()))
            .collect();
        if !items.is_empty() {
            self.adapter.multi_set(&items).await?;
        }
        for resource in views.removed {
            self.adapter.delete(&keys::external_view(&snapshot.cluster, &resource)).await?;
        }
        Ok(())
    }

    /// Persist computed assignments onto the ideal-state records when the
    /// cluster asks for it. Best effort: failures log and do not abort.
    async fn persist_assignments(
        &self, snapshot: &ClusterSnapshot, best: &stages::BestPossibleOutput, intermediate: &stages::IntermediateOutput,
    ) {
        let assignments: Vec<(&str, &crate::rebalancer::ResourceAssignment)> = match (
            snapshot.config.persist_best_possible(),
            snapshot.config.persist_intermediate(),
        ) {
            (_, true) => intermediate.resources().map(|(name, map)| (name.as_str(), map)).collect(),
            (true, false) => best.resources().map(|(name, map)| (name.as_str(), map)).collect(),
            (false, false) => return,
        };
        for (resource, assignment) in assignments {
            let path = keys::ideal_state(&snapshot.cluster, resource);
            let assignment = assignment.clone();
            let res = self
                .adapter
                .update(&path, move |record| {
                    let mut record = record.unwrap_or_else(|| meson_core::record::Record::new(resource));
                    for (partition, map) in &assignment {
                        record.set_map(partition.clone(), map.clone());
                    }
                    record
                })
                .await;
            if let Err(err) = res {
                tracing::warn!(error = %err, resource = %resource, "error persisting computed assignment");
            }
        }
    }

    /// Report per-resource replica deficits to the monitor.
    fn report_deficits(
        &self, _snapshot: &ClusterSnapshot, resources: &stages::ResourceMap, current: &stages::CurrentStateOutput,
    ) {
        let names: Vec<&str> = resources.keys().map(String::as_str).collect();
        self.sink.retain_resources(&names);
        for (name, resource) in resources {
            let mut deficit = 0;
            for partition in &resource.partitions {
                let healthy = current
                    .current_state_map(name, partition)
                    .values()
                    .filter(|state| state.as_str() != ERROR_STATE && state.as_str() != DROPPED_STATE)
                    .count() as u32;
                deficit += resource.replicas.saturating_sub(healthy);
            }
            self.sink.set_replica_deficit(name, deficit);
        }
    }
}

/// The controller actor: owns the runner and drives it from store events.
pub struct ClusterController<C: StoreClient> {
    config: Arc<Config>,
    adapter: StoreAdapter<C>,
    runner: PipelineRunner<C>,

    /// Merged trigger channel fed by all watch forwarders.
    triggers_tx: mpsc::UnboundedSender<()>,
    /// Merged trigger channel fed by all watch forwarders.
    triggers_rx: mpsc::UnboundedReceiver<()>,
    /// Paths already subscribed, to keep watch registration idempotent.
    watched: HashSet<String>,
    /// The next delayed-rebalance expiry to wake at.
    next_wakeup_ms: Option<i64>,

    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
}

impl<C: StoreClient> ClusterController<C> {
    pub fn new(
        config: Arc<Config>, adapter: StoreAdapter<C>, registry: RebalancerRegistry, sink: Arc<dyn StatusSink>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let runner = PipelineRunner::new(
            adapter.clone(),
            config.cluster.clone(),
            config.controller_name.clone(),
            registry,
            sink,
        );
        let (triggers_tx, triggers_rx) = mpsc::unbounded_channel();
        Self {
            config,
            adapter,
            runner,
            triggers_tx,
            triggers_rx,
            watched: HashSet::new(),
            next_wakeup_ms: None,
            shutdown_rx: BroadcastStream::new(shutdown),
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::info!(cluster = %self.config.cluster, "cluster controller started");
        self.sync_watches().await;

        let mut refresh = tokio::time::interval(Duration::from_secs(self.config.refresh_interval_seconds.max(1)));
        refresh.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let wakeup = self.next_wakeup_ms.map(|expiry| {
                let now = Utc::now().timestamp_millis();
                Duration::from_millis(expiry.saturating_sub(now).max(0) as u64)
            });
            tokio::select! {
                Some(_) = self.triggers_rx.recv() => {
                    // Debounce, then collapse every queued trigger into one run.
                    tokio::time::sleep(Duration::from_millis(self.config.pipeline_debounce_ms)).await;
                    while self.triggers_rx.try_recv().is_ok() {}
                    self.run_pipeline().await;
                }
                _ = refresh.tick() => self.run_pipeline().await,
                _ = sleep_opt(wakeup), if wakeup.is_some() => {
                    self.next_wakeup_ms = None;
                    self.run_pipeline().await;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        tracing::debug!(cluster = %self.config.cluster, "cluster controller shutdown");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn run_pipeline(&mut self) {
        match self.runner.run_once().await {
            Ok(outcome) => self.next_wakeup_ms = outcome.next_wakeup_ms,
            Err(err) => {
                tracing::error!(error = %err, cluster = %self.config.cluster, "pipeline run failed");
            }
        }
        // Membership may have changed; cover any new subtrees.
        self.sync_watches().await;
    }

    /// Subscribe to any watch paths the cache now cares about.
    async fn sync_watches(&mut self) {
        for dir in self.runner.cache().watch_dirs() {
            if !self.watched.insert(format!("c:{}", dir)) {
                continue;
            }
            match self.adapter.watch_children(&dir).await {
                Ok(rx) => self.forward(rx),
                Err(err) => tracing::warn!(error = %err, path = %dir, "error registering child watch"),
            }
        }
        for path in self.runner.cache().watch_data_paths() {
            if !self.watched.insert(format!("d:{}", path)) {
                continue;
            }
            match self.adapter.watch_data(&path).await {
                Ok(rx) => self.forward(rx),
                Err(err) => tracing::warn!(error = %err, path = %path, "error registering data watch"),
            }
        }
    }

    /// Forward watch events into the merged trigger channel.
    fn forward(&self, mut rx: mpsc::UnboundedReceiver<meson_core::store::WatchEvent>) {
        let tx = self.triggers_tx.clone();
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
    }
}

async fn sleep_opt(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
