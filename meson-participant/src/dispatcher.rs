//! Keyed task dispatch.
//!
//! A concurrent map from (resource, partition) to a single-slot task queue
//! atop a shared worker budget: at most one task per key runs at a time,
//! different keys run in parallel up to the budget. Handler invocations are
//! the only application code and may block arbitrarily; the semaphore
//! bounds how many do so concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};

/// The key a task serializes on.
pub type TaskKey = (String, String);

type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The keyed dispatcher shared by a participant's executor.
#[derive(Clone)]
pub struct KeyedDispatcher {
    slots: Arc<DashMap<TaskKey, mpsc::UnboundedSender<Task>>>,
    workers: Arc<Semaphore>,
}

impl KeyedDispatcher {
    /// Create a dispatcher with the given concurrent-task budget.
    pub fn new(workers: usize) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Enqueue a task for the given key, behind any task already queued
    /// for it.
    pub fn submit<F>(&self, key: TaskKey, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task: Task = Box::pin(task);
        // Entry-level lock makes get-or-spawn atomic per key.
        let entry = self.slots.entry(key.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.spawn_worker(key, rx);
            tx
        });
        if entry.send(task).is_err() {
            tracing::error!("keyed dispatcher worker is gone, task dropped");
        }
    }

    /// Retire a key once its replica is dropped. Tasks already queued for
    /// the key still run; the worker exits after draining them.
    pub fn retire(&self, key: &TaskKey) {
        self.slots.remove(key);
    }

    fn spawn_worker(&self, key: TaskKey, mut rx: mpsc::UnboundedReceiver<Task>) {
        let workers = self.workers.clone();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let permit = match workers.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    // Semaphore closed, dispatcher is shutting down.
                    Err(_) => break,
                };
                task.await;
                drop(permit);
            }
            tracing::trace!(resource = %key.0, partition = %key.1, "keyed dispatcher worker exited");
        });
    }
}
