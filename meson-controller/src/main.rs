//! The Meson controller daemon.
//!
//! Runs the control loop for one cluster. The binary wires an in-process
//! store for standalone development; deployments embed the controller
//! library against their coordination-store client.

use std::mem::MaybeUninit;
use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use tokio::sync::broadcast;
use tracing_subscriber::prelude::*;

use meson_controller::admin::ClusterAdmin;
use meson_controller::app::App;
use meson_controller::rebalancer::RebalancerRegistry;
use meson_controller::Config;
use meson_core::model::ClusterConfig;
use meson_core::store::{MemoryStore, StoreAdapter};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true).with_ansi(true))
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let cfg = Arc::new(Config::new()?);
    let recorder = get_metrics_recorder(&cfg);
    metrics::set_recorder(recorder).context("error setting prometheus metrics recorder")?;

    tracing::info!(
        cluster = %cfg.cluster,
        controller_name = %cfg.controller_name,
        pipeline_debounce_ms = %cfg.pipeline_debounce_ms,
        refresh_interval_seconds = %cfg.refresh_interval_seconds,
        "starting Meson controller",
    );

    // Standalone mode: an in-process store seeded with the cluster skeleton.
    let store = MemoryStore::new();
    let client = Arc::new(store.connect());
    ClusterAdmin::new(StoreAdapter::new(client.clone()), cfg.cluster.clone())
        .create_cluster(&ClusterConfig::new(cfg.cluster.clone()))
        .await
        .context("error creating cluster skeleton")?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let registry = RebalancerRegistry::new();
    if let Err(err) = App::new(cfg, client, registry, shutdown_tx.clone()).await?.spawn().await {
        tracing::error!(error = ?err);
        let _res = shutdown_tx.send(());
    }

    Ok(())
}

/// Get a handle to the metrics recorder, initializing it as needed.
fn get_metrics_recorder(config: &Config) -> &'static PrometheusRecorder {
    static mut RECORDER: MaybeUninit<PrometheusRecorder> = MaybeUninit::uninit();
    static ONCE: Once = Once::new();
    unsafe {
        ONCE.call_once(|| {
            RECORDER.write(
                PrometheusBuilder::new()
                    .idle_timeout(metrics_util::MetricKindMask::ALL, Some(std::time::Duration::from_secs(60 * 60)))
                    .add_global_label("cluster", config.cluster.clone())
                    .add_global_label("controller", config.controller_name.clone())
                    .build(),
            );
        });
        RECORDER.assume_init_ref()
    }
}
