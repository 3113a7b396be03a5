use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use meson_core::keys;
use meson_core::model::CurrentState;
use meson_core::store::{MemoryStore, StoreAdapter};

use crate::config::Config;
use crate::executor::ParticipantExecutor;
use crate::fixtures::{await_message_gone, await_state, queue_message, seed_cluster, RecordingFactory, TransitionLog};
use crate::state_model::StateModelRegistry;

const CLUSTER: &str = "alpha";
const INSTANCE: &str = "i1";

fn registry_with(factory: RecordingFactory) -> StateModelRegistry {
    let mut registry = StateModelRegistry::new();
    registry.register("MasterSlave", Arc::new(factory));
    registry
}

#[tokio::test]
async fn completed_transition_publishes_state_and_info() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let log: TransitionLog = Default::default();
    let registry = registry_with(RecordingFactory { log: log.clone(), ..Default::default() });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let session = exec_adapter.session_id().to_string();
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    let msg = queue_message(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", "OFFLINE", "SLAVE").await?;
    executor.submit(msg.clone());

    await_state(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", Some("SLAVE")).await?;
    await_message_gone(&admin, CLUSTER, INSTANCE, msg.id()).await?;

    let (record, _) = admin
        .get_record(&keys::current_state(CLUSTER, INSTANCE, &session, "db"))
        .await?
        .expect("current state record must exist");
    let state = CurrentState::from_record(record);
    assert_eq!(state.info("db_0"), Some("OFFLINE->SLAVE"), "handler info must be published");
    assert_eq!(state.requested_state("db_0"), None, "requested state must be cleared");
    assert_eq!(log.lock().await.as_slice(), &[("db_0".to_string(), "OFFLINE".to_string(), "SLAVE".to_string())]);

    Ok(())
}

#[tokio::test]
async fn handler_failure_marks_replica_error() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let log: TransitionLog = Default::default();
    let registry = registry_with(RecordingFactory {
        log: log.clone(),
        fail_partitions: HashSet::from(["db_0".to_string()]),
        ..Default::default()
    });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let session = exec_adapter.session_id().to_string();
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    let msg = queue_message(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", "OFFLINE", "SLAVE").await?;
    executor.submit(msg.clone());

    await_state(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", Some("ERROR")).await?;
    await_message_gone(&admin, CLUSTER, INSTANCE, msg.id()).await?;

    Ok(())
}

#[tokio::test]
async fn stale_session_message_is_discarded_without_invocation() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let log: TransitionLog = Default::default();
    let registry = registry_with(RecordingFactory { log: log.clone(), ..Default::default() });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    let msg = queue_message(&admin, CLUSTER, INSTANCE, "dead-session", "db", "db_0", "OFFLINE", "SLAVE").await?;
    executor.submit(msg.clone());

    await_message_gone(&admin, CLUSTER, INSTANCE, msg.id()).await?;
    assert!(log.lock().await.is_empty(), "handler must not run for a stale session");

    Ok(())
}

#[tokio::test]
async fn from_state_mismatch_is_discarded_without_invocation() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let log: TransitionLog = Default::default();
    let registry = registry_with(RecordingFactory { log: log.clone(), ..Default::default() });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let session = exec_adapter.session_id().to_string();
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    // The replica already reports SLAVE; an OFFLINE→SLAVE message is stale.
    let mut seeded = CurrentState::new("db", session.clone(), "MasterSlave");
    seeded.set_state("db_0", "SLAVE");
    admin
        .set_record(&keys::current_state(CLUSTER, INSTANCE, &session, "db"), seeded.record())
        .await?;

    let msg = queue_message(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", "OFFLINE", "SLAVE").await?;
    executor.submit(msg.clone());

    await_message_gone(&admin, CLUSTER, INSTANCE, msg.id()).await?;
    assert!(log.lock().await.is_empty(), "handler must not run on a from-state mismatch");
    await_state(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", Some("SLAVE")).await?;

    Ok(())
}

#[tokio::test]
async fn transitions_serialize_per_partition() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let log: TransitionLog = Default::default();
    let registry = registry_with(RecordingFactory {
        log: log.clone(),
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let session = exec_adapter.session_id().to_string();
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    // Two hops for the same replica, submitted back to back. The second is
    // only valid once the first has completed and published.
    let first = queue_message(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", "OFFLINE", "SLAVE").await?;
    let second = queue_message(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", "SLAVE", "MASTER").await?;
    executor.submit(first);
    executor.submit(second);

    await_state(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", Some("MASTER")).await?;
    let observed = log.lock().await.clone();
    assert_eq!(
        observed,
        vec![
            ("db_0".to_string(), "OFFLINE".to_string(), "SLAVE".to_string()),
            ("db_0".to_string(), "SLAVE".to_string(), "MASTER".to_string()),
        ],
        "handler invocations must follow dispatch order"
    );

    Ok(())
}

#[tokio::test]
async fn handler_timeout_promotes_to_error() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let registry = registry_with(RecordingFactory {
        delay: Duration::from_millis(500),
        ..Default::default()
    });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let session = exec_adapter.session_id().to_string();
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    let mut msg =
        meson_core::model::Message::new_state_transition("controller-0", INSTANCE, &session, "db", "db_0", "MasterSlave", "OFFLINE", "SLAVE");
    msg.set_timeout_ms(30);
    admin
        .set_record(&keys::message(CLUSTER, INSTANCE, msg.id()), msg.record())
        .await?;
    executor.submit(msg.clone());

    await_state(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", Some("ERROR")).await?;
    await_message_gone(&admin, CLUSTER, INSTANCE, msg.id()).await?;

    Ok(())
}

#[tokio::test]
async fn dropped_replica_is_removed_from_current_state() -> Result<()> {
    let store = MemoryStore::new();
    let admin = seed_cluster(&store, CLUSTER, INSTANCE).await?;
    let log: TransitionLog = Default::default();
    let registry = registry_with(RecordingFactory { log: log.clone(), ..Default::default() });
    let exec_adapter = StoreAdapter::new(Arc::new(store.connect()));
    let session = exec_adapter.session_id().to_string();
    let executor = ParticipantExecutor::new(Config::new_test(CLUSTER, INSTANCE), exec_adapter, registry);

    let msg = queue_message(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", "OFFLINE", "DROPPED").await?;
    executor.submit(msg.clone());

    await_message_gone(&admin, CLUSTER, INSTANCE, msg.id()).await?;
    await_state(&admin, CLUSTER, INSTANCE, &session, "db", "db_0", None).await?;

    Ok(())
}
