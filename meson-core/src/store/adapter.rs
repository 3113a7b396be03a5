//! Typed, batched access to the coordination store.
//!
//! Layers the access patterns every caller needs over a raw `StoreClient`:
//! recursive parent creation, optimistic read-modify-write, bounded retry of
//! transient failures, per-call timeouts, and batched async variants which
//! issue all operations before awaiting any of them.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::record::Record;
use crate::store::{CreateMode, Stat, StoreClient, WatchEvent, ANY_VERSION};

/// Bounded attempts for transient failures & optimistic-update conflicts.
const RETRY_ATTEMPTS: usize = 5;
/// Delay between transient-failure retries.
const RETRY_DELAY: Duration = Duration::from_millis(50);
/// Default per-call timeout.
const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// A typed store accessor shared across a process.
pub struct StoreAdapter<C: StoreClient> {
    client: Arc<C>,
    op_timeout: Duration,
}

impl<C: StoreClient> Clone for StoreAdapter<C> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), op_timeout: self.op_timeout }
    }
}

impl<C: StoreClient> StoreAdapter<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client, op_timeout: OP_TIMEOUT }
    }

    /// The underlying session-scoped client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// The id of the underlying store session.
    pub fn session_id(&self) -> &str {
        self.client.session_id()
    }

    /// Run one store call under the per-call timeout; elapsed calls surface
    /// as transient errors so the enclosing stage can abort cleanly.
    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Transient("store call timed out".into())),
        }
    }

    /// Retry transient failures with bounded attempts.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match self.bounded(op()).await {
                Err(err) if err.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    /// Create a node, recursively creating missing persistent parents.
    ///
    /// Returns every path created, parents included, so callers can roll the
    /// creation back after a failed batch.
    pub async fn create_with_parents(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> StoreResult<Vec<String>> {
        let mut created = Vec::new();
        loop {
            match self.with_retry(|| self.client.create(path, data.clone(), mode)).await {
                Ok(()) => {
                    created.push(path.to_string());
                    return Ok(created);
                }
                Err(StoreError::NotFound(missing)) => {
                    created.extend(self.ensure_path(&missing).await?);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Ensure a directory path exists, creating missing persistent ancestors.
    pub async fn ensure_path(&self, path: &str) -> StoreResult<Vec<String>> {
        let mut missing = Vec::new();
        let mut cursor = Some(path.to_string());
        while let Some(current) = cursor {
            if current == "/" || self.with_retry(|| self.client.exists(&current)).await? {
                break;
            }
            cursor = keys::parent(&current).map(str::to_string);
            missing.push(current);
        }
        let mut created = Vec::new();
        for current in missing.into_iter().rev() {
            match self.with_retry(|| self.client.create(&current, Vec::new(), CreateMode::Persistent)).await {
                Ok(()) => created.push(current),
                // Lost a create race; the node exists, which is all we need.
                Err(StoreError::NodeExists(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(created)
    }

    /// Write a record unconditionally, creating the node & parents as needed.
    pub async fn set_record(&self, path: &str, record: &Record) -> StoreResult<()> {
        let data = record.to_bytes();
        match self.with_retry(|| self.client.set(path, data.clone(), ANY_VERSION)).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => self.create_with_parents(path, data, CreateMode::Persistent).await.map(|_| ()),
            Err(err) => Err(err),
        }
    }

    /// Create a record node; fails if it already exists.
    pub async fn create_record(&self, path: &str, record: &Record, mode: CreateMode) -> StoreResult<Vec<String>> {
        self.create_with_parents(path, record.to_bytes(), mode).await
    }

    /// Read a record; `None` when the node is absent.
    pub async fn get_record(&self, path: &str) -> StoreResult<Option<(Record, Stat)>> {
        match self.with_retry(|| self.client.get(path)).await {
            Ok((data, stat)) => Ok(Some((Record::from_bytes(path, &data)?, stat))),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Optimistic read-modify-write of one record.
    ///
    /// Reads the node, applies `apply`, writes back with the read version;
    /// version conflicts re-read and retry. A missing node escalates to a
    /// create with the function applied to `None`.
    pub async fn update<F>(&self, path: &str, mut apply: F) -> StoreResult<Record>
    where
        F: FnMut(Option<Record>) -> Record,
    {
        let mut attempt = 0;
        loop {
            let current = self.get_record(path).await?;
            match current {
                Some((record, stat)) => {
                    let next = apply(Some(record));
                    match self.with_retry(|| self.client.set(path, next.to_bytes(), stat.version)).await {
                        Ok(_) => return Ok(next),
                        Err(StoreError::VersionConflict { .. }) if attempt + 1 < RETRY_ATTEMPTS => attempt += 1,
                        Err(err) => return Err(err),
                    }
                }
                None => {
                    let next = apply(None);
                    match self.create_with_parents(path, next.to_bytes(), CreateMode::Persistent).await {
                        Ok(_) => return Ok(next),
                        // Lost a create race; loop around and update instead.
                        Err(StoreError::NodeExists(_)) if attempt + 1 < RETRY_ATTEMPTS => attempt += 1,
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    /// Delete a node if present, ignoring absence.
    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        match self.with_retry(|| self.client.delete(path, ANY_VERSION)).await {
            Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Delete a subtree depth-first.
    pub async fn delete_recursive(&self, path: &str) -> StoreResult<()> {
        let children = match self.with_retry(|| self.client.get_children(path)).await {
            Ok(children) => children,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        for child in children {
            Box::pin(self.delete_recursive(&format!("{}/{}", path, child))).await?;
        }
        self.delete(path).await
    }

    pub async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.with_retry(|| self.client.exists(path)).await
    }

    pub async fn get_stat(&self, path: &str) -> StoreResult<Option<Stat>> {
        self.with_retry(|| self.client.get_stat(path)).await
    }

    /// Child names of a directory; absent directories read as empty.
    pub async fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
        match self.with_retry(|| self.client.get_children(path)).await {
            Ok(children) => Ok(children),
            Err(StoreError::NotFound(_)) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    /// Batched read: all gets are issued, then awaited together. Missing
    /// nodes read as `None`; any other failure fails the batch.
    pub async fn multi_get(&self, paths: &[String]) -> StoreResult<Vec<Option<(Record, Stat)>>> {
        let futs = paths.iter().map(|path| self.get_record(path));
        join_all(futs).await.into_iter().collect()
    }

    /// Batched create with per-index outcomes.
    ///
    /// All creates are issued then awaited; indexes which failed with
    /// `NotFound` get their parents created in a second pass and the original
    /// op retried, mirroring single-op parent repair.
    pub async fn multi_create(&self, items: &[(String, Record)], mode: CreateMode) -> StoreResult<Vec<StoreResult<()>>> {
        let futs = items
            .iter()
            .map(|(path, record)| self.with_retry(move || self.client.create(path, record.to_bytes(), mode)));
        let mut outcomes: Vec<StoreResult<()>> = join_all(futs).await;

        let missing: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, res)| matches!(res, Err(StoreError::NotFound(_))))
            .map(|(idx, _)| idx)
            .collect();
        for idx in missing {
            let (path, record) = &items[idx];
            outcomes[idx] = self.create_with_parents(path, record.to_bytes(), mode).await.map(|_| ());
        }
        Ok(outcomes)
    }

    /// Batched unconditional set with per-index outcomes.
    pub async fn multi_set(&self, items: &[(String, Record)]) -> StoreResult<Vec<StoreResult<()>>> {
        let futs = items.iter().map(|(path, record)| self.set_record(path, record));
        Ok(join_all(futs).await)
    }

    /// Batched delete with per-index outcomes; absence is success.
    pub async fn multi_delete(&self, paths: &[String]) -> StoreResult<Vec<StoreResult<()>>> {
        let futs = paths.iter().map(|path| self.delete(path));
        Ok(join_all(futs).await)
    }

    pub async fn watch_data(&self, path: &str) -> StoreResult<tokio::sync::mpsc::UnboundedReceiver<WatchEvent>> {
        self.client.watch_data(path).await
    }

    pub async fn watch_children(&self, path: &str) -> StoreResult<tokio::sync::mpsc::UnboundedReceiver<WatchEvent>> {
        self.client.watch_children(path).await
    }
}
