use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;

use meson_core::keys;
use meson_core::model::LiveInstance;
use meson_core::store::{MemoryStore, StoreAdapter, StoreClient};

use crate::config::Config;
use crate::fixtures::seed_cluster;
use crate::manager::Participant;
use crate::state_model::StateModelRegistry;

#[tokio::test]
async fn participant_registers_and_deregisters_liveness() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, "alpha", "i1").await?;

    let client = Arc::new(store.connect());
    let session = client.session_id().to_string();
    let (shutdown_tx, _) = broadcast::channel(1);
    let participant =
        Participant::new(Config::new_test("alpha", "i1"), client, StateModelRegistry::new(), shutdown_tx.clone()).await?;
    let handle = participant.spawn();

    let (record, stat) = admin
        .get_record(&keys::live_instance("alpha", "i1"))
        .await?
        .expect("live instance marker must exist");
    assert!(stat.ephemeral, "liveness marker must be ephemeral");
    assert_eq!(LiveInstance::from_record(record).session_id(), session);

    let _ = shutdown_tx.send(());
    tokio::time::timeout(Duration::from_secs(5), handle).await???;
    assert!(!admin.exists(&keys::live_instance("alpha", "i1")).await?, "marker must be removed on shutdown");

    Ok(())
}

#[tokio::test]
async fn unconfigured_instance_is_refused() -> Result<()> {
    let store = MemoryStore::new();
    let _admin = seed_cluster(&store, "alpha", "i1").await?;

    let client = Arc::new(store.connect());
    let (shutdown_tx, _) = broadcast::channel(1);
    let res = Participant::new(Config::new_test("alpha", "i9"), client, StateModelRegistry::new(), shutdown_tx).await;
    assert!(res.is_err(), "an unconfigured instance must be refused");

    Ok(())
}

#[tokio::test]
async fn inbound_message_flows_from_watcher_to_handler() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, "alpha", "i1").await?;

    let log: crate::fixtures::TransitionLog = Default::default();
    let mut registry = StateModelRegistry::new();
    registry.register("MasterSlave", Arc::new(crate::fixtures::RecordingFactory { log: log.clone(), ..Default::default() }));

    let client = Arc::new(store.connect());
    let session = client.session_id().to_string();
    let (shutdown_tx, _) = broadcast::channel(1);
    let participant = Participant::new(Config::new_test("alpha", "i1"), client, registry, shutdown_tx.clone()).await?;
    let _handle = participant.spawn();

    let msg = crate::fixtures::queue_message(&admin, "alpha", "i1", &session, "db", "db_0", "OFFLINE", "SLAVE").await?;
    crate::fixtures::await_state(&admin, "alpha", "i1", &session, "db", "db_0", Some("SLAVE")).await?;
    crate::fixtures::await_message_gone(&admin, "alpha", "i1", msg.id()).await?;

    let _ = shutdown_tx.send(());
    Ok(())
}
