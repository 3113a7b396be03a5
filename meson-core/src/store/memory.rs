//! An in-process coordination store with ZooKeeper-shaped semantics.
//!
//! Hierarchical versioned nodes, ephemeral nodes bound to sessions,
//! optimistic writes, data & child watches. Backs every test in the
//! workspace and the demo wiring; it is not a persistence engine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::keys;
use crate::store::{CreateMode, Stat, StoreClient, WatchEvent, ANY_VERSION};

#[derive(Clone, Debug)]
struct Node {
    data: Vec<u8>,
    version: i32,
    ephemeral_owner: Option<String>,
    ctime_ms: i64,
    mtime_ms: i64,
}

impl Node {
    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            ephemeral: self.ephemeral_owner.is_some(),
            ctime_ms: self.ctime_ms,
            mtime_ms: self.mtime_ms,
        }
    }
}

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, Node>,
    sessions: HashSet<String>,
    data_watches: HashMap<String, Vec<mpsc::UnboundedSender<WatchEvent>>>,
    child_watches: HashMap<String, Vec<mpsc::UnboundedSender<WatchEvent>>>,
}

impl Inner {
    fn fire_data(&mut self, path: &str, event: WatchEvent) {
        if let Some(subs) = self.data_watches.get_mut(path) {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn fire_children(&mut self, parent: &str) {
        if let Some(subs) = self.child_watches.get_mut(parent) {
            let event = WatchEvent::ChildrenChanged(parent.to_string());
            subs.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(have, _)| have.starts_with(&prefix))
            .next()
            .is_some()
    }

    fn remove_node(&mut self, path: &str) {
        self.nodes.remove(path);
        self.fire_data(path, WatchEvent::DataDeleted(path.to_string()));
        if let Some(parent) = keys::parent(path) {
            let parent = parent.to_string();
            self.fire_children(&parent);
        }
    }
}

/// The shared in-memory store. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session against this store.
    pub fn connect(&self) -> MemoryClient {
        let session = Uuid::new_v4().to_string();
        self.inner
            .lock()
            .expect("memory store lock poisoned")
            .sessions
            .insert(session.clone());
        MemoryClient { store: self.clone(), session }
    }

    /// Expire a session, deleting its ephemeral nodes and firing watches.
    ///
    /// Used by tests to simulate a participant disappearing.
    pub fn expire_session(&self, session: &str) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.sessions.remove(session);
        let ephemerals: Vec<String> = inner
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner.as_deref() == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in ephemerals {
            inner.remove_node(&path);
        }
    }
}

/// One session of the in-memory store.
pub struct MemoryClient {
    store: MemoryStore,
    session: String,
}

impl MemoryClient {
    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        let inner = self.store.inner.lock().expect("memory store lock poisoned");
        if !inner.sessions.contains(&self.session) {
            return Err(StoreError::SessionExpired);
        }
        Ok(inner)
    }

    /// The backing store, for opening further sessions or expiring this one.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl StoreClient for MemoryClient {
    fn session_id(&self) -> &str {
        &self.session
    }

    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.nodes.contains_key(path) {
            return Err(StoreError::NodeExists(path.to_string()));
        }
        if let Some(parent) = keys::parent(path) {
            if parent != "/" && !inner.nodes.contains_key(parent) {
                return Err(StoreError::NotFound(parent.to_string()));
            }
        }
        let now = Utc::now().timestamp_millis();
        let ephemeral_owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(self.session.clone()),
        };
        inner.nodes.insert(
            path.to_string(),
            Node { data, version: 0, ephemeral_owner, ctime_ms: now, mtime_ms: now },
        );
        inner.fire_data(path, WatchEvent::DataChanged(path.to_string()));
        if let Some(parent) = keys::parent(path) {
            let parent = parent.to_string();
            inner.fire_children(&parent);
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)> {
        let inner = self.lock()?;
        let node = inner.nodes.get(path).ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok((node.data.clone(), node.stat()))
    }

    async fn set(&self, path: &str, data: Vec<u8>, expected_version: i32) -> StoreResult<Stat> {
        let mut inner = self.lock()?;
        let node = inner.nodes.get_mut(path).ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if expected_version != ANY_VERSION && node.version != expected_version {
            return Err(StoreError::VersionConflict {
                path: path.to_string(),
                expected: expected_version,
                actual: node.version,
            });
        }
        node.data = data;
        node.version += 1;
        node.mtime_ms = Utc::now().timestamp_millis();
        let stat = node.stat();
        inner.fire_data(path, WatchEvent::DataChanged(path.to_string()));
        Ok(stat)
    }

    async fn delete(&self, path: &str, expected_version: i32) -> StoreResult<()> {
        let mut inner = self.lock()?;
        let node = inner.nodes.get(path).ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if expected_version != ANY_VERSION && node.version != expected_version {
            return Err(StoreError::VersionConflict {
                path: path.to_string(),
                expected: expected_version,
                actual: node.version,
            });
        }
        if inner.has_children(path) {
            return Err(StoreError::NotEmpty(path.to_string()));
        }
        inner.remove_node(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.lock()?.nodes.contains_key(path))
    }

    async fn get_stat(&self, path: &str) -> StoreResult<Option<Stat>> {
        Ok(self.lock()?.nodes.get(path).map(Node::stat))
    }

    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
        let inner = self.lock()?;
        if path != "/" && !inner.nodes.contains_key(path) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
        let children = inner
            .nodes
            .range(prefix.clone()..)
            .take_while(|(have, _)| have.starts_with(&prefix))
            .filter(|(have, _)| !have[prefix.len()..].contains('/'))
            .map(|(have, _)| have[prefix.len()..].to_string())
            .collect();
        Ok(children)
    }

    async fn watch_data(&self, path: &str) -> StoreResult<mpsc::UnboundedReceiver<WatchEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()?.data_watches.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn watch_children(&self, path: &str) -> StoreResult<mpsc::UnboundedReceiver<WatchEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()?.child_watches.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }
}
