use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::dispatcher::KeyedDispatcher;

fn key(resource: &str, partition: &str) -> (String, String) {
    (resource.to_string(), partition.to_string())
}

#[tokio::test]
async fn tasks_serialize_per_key() {
    let dispatcher = KeyedDispatcher::new(4);
    let log: Arc<Mutex<Vec<u32>>> = Default::default();

    for seq in 0..5u32 {
        let log = log.clone();
        dispatcher.submit(key("db", "db_0"), async move {
            // The sleep gives later submissions a window to overtake if
            // serialization were broken.
            tokio::time::sleep(Duration::from_millis(10)).await;
            log.lock().await.push(seq);
        });
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(log.lock().await.as_slice(), &[0, 1, 2, 3, 4], "same-key tasks must run in submission order");
}

#[tokio::test]
async fn distinct_keys_run_concurrently() {
    let dispatcher = KeyedDispatcher::new(4);
    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Default::default();

    for partition in ["db_0", "db_1"] {
        let spans = spans.clone();
        dispatcher.submit(key("db", partition), async move {
            let started = Instant::now();
            tokio::time::sleep(Duration::from_millis(50)).await;
            spans.lock().await.push((started, Instant::now()));
        });
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let spans = spans.lock().await;
    assert_eq!(spans.len(), 2);
    let overlap = spans[0].0 < spans[1].1 && spans[1].0 < spans[0].1;
    assert!(overlap, "distinct keys must run in parallel, got {:?}", spans);
}

#[tokio::test]
async fn worker_budget_bounds_concurrency() {
    let dispatcher = KeyedDispatcher::new(1);
    let spans: Arc<Mutex<Vec<(Instant, Instant)>>> = Default::default();

    for partition in ["db_0", "db_1"] {
        let spans = spans.clone();
        dispatcher.submit(key("db", partition), async move {
            let started = Instant::now();
            tokio::time::sleep(Duration::from_millis(30)).await;
            spans.lock().await.push((started, Instant::now()));
        });
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    let spans = spans.lock().await;
    assert_eq!(spans.len(), 2);
    let overlap = spans[0].0 < spans[1].1 && spans[1].0 < spans[0].1;
    assert!(!overlap, "a budget of one must serialize across keys, got {:?}", spans);
}
