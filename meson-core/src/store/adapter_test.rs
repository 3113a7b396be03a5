use std::sync::Arc;

use anyhow::Result;

use crate::record::Record;
use crate::store::{CreateMode, MemoryStore, StoreAdapter, StoreClient};

fn adapter(store: &MemoryStore) -> StoreAdapter<crate::store::MemoryClient> {
    StoreAdapter::new(Arc::new(store.connect()))
}

#[tokio::test]
async fn create_with_parents_reports_created_paths() -> Result<()> {
    let store = MemoryStore::new();
    let adapter = adapter(&store);

    let record = Record::new("r1");
    let created = adapter
        .create_record("/alpha/IDEALSTATES/r1", &record, CreateMode::Persistent)
        .await?;
    assert_eq!(
        created,
        vec!["/alpha".to_string(), "/alpha/IDEALSTATES".to_string(), "/alpha/IDEALSTATES/r1".to_string()]
    );

    let read = adapter.get_record("/alpha/IDEALSTATES/r1").await?;
    assert_eq!(read.map(|(rec, _)| rec.id), Some("r1".to_string()));

    Ok(())
}

#[tokio::test]
async fn update_applies_against_latest_version() -> Result<()> {
    let store = MemoryStore::new();
    let writer = adapter(&store);
    let racer = store.connect();

    let record = Record::new("counter");
    writer.create_record("/alpha/node", &record, CreateMode::Persistent).await?;

    // A competing writer has already bumped the version past the create.
    racer
        .set("/alpha/node", Record::new("counter").to_bytes(), crate::store::ANY_VERSION)
        .await?;

    let updated = writer
        .update("/alpha/node", |current| {
            let mut record = current.unwrap_or_else(|| Record::new("counter"));
            let count = record.get_i64("COUNT").unwrap_or(0);
            record.set_i64("COUNT", count + 1);
            record
        })
        .await?;
    assert_eq!(updated.get_i64("COUNT"), Some(1));

    Ok(())
}

#[tokio::test]
async fn update_escalates_missing_node_to_create() -> Result<()> {
    let store = MemoryStore::new();
    let writer = adapter(&store);

    let updated = writer
        .update("/alpha/INSTANCES/i0/CURRENTSTATES/s1/r1", |current| {
            assert!(current.is_none(), "expected missing node");
            Record::new("r1")
        })
        .await?;
    assert_eq!(updated.id, "r1");
    assert!(writer.exists("/alpha/INSTANCES/i0/CURRENTSTATES/s1/r1").await?);

    Ok(())
}

#[tokio::test]
async fn multi_create_repairs_missing_parents() -> Result<()> {
    let store = MemoryStore::new();
    let adapter = adapter(&store);

    let items = vec![
        ("/alpha/INSTANCES/i0/MESSAGES/m1".to_string(), Record::new("m1")),
        ("/alpha/INSTANCES/i1/MESSAGES/m2".to_string(), Record::new("m2")),
    ];
    let outcomes = adapter.multi_create(&items, CreateMode::Persistent).await?;
    assert!(outcomes.iter().all(Result::is_ok), "expected all creates to succeed got {:?}", outcomes);
    for (path, _) in &items {
        assert!(adapter.exists(path).await?, "expected {} to exist", path);
    }

    Ok(())
}

#[tokio::test]
async fn multi_get_maps_absent_to_none() -> Result<()> {
    let store = MemoryStore::new();
    let adapter = adapter(&store);
    adapter.create_record("/alpha/a", &Record::new("a"), CreateMode::Persistent).await?;

    let paths = vec!["/alpha/a".to_string(), "/alpha/missing".to_string()];
    let records = adapter.multi_get(&paths).await?;
    assert_eq!(records.len(), 2);
    assert!(records[0].is_some());
    assert!(records[1].is_none());

    Ok(())
}

#[tokio::test]
async fn delete_recursive_removes_subtree() -> Result<()> {
    let store = MemoryStore::new();
    let adapter = adapter(&store);
    adapter
        .create_record("/alpha/INSTANCES/i0/CURRENTSTATES/s1/r1", &Record::new("r1"), CreateMode::Persistent)
        .await?;
    adapter
        .create_record("/alpha/INSTANCES/i0/CURRENTSTATES/s1/r2", &Record::new("r2"), CreateMode::Persistent)
        .await?;

    adapter.delete_recursive("/alpha/INSTANCES/i0/CURRENTSTATES/s1").await?;
    assert!(!adapter.exists("/alpha/INSTANCES/i0/CURRENTSTATES/s1").await?);
    assert!(adapter.exists("/alpha/INSTANCES/i0/CURRENTSTATES").await?);

    Ok(())
}
