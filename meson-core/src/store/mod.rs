//! The coordination-store interface.
//!
//! The store itself is an external collaborator: a hierarchical, versioned
//! KV service with ephemeral nodes, data/child watches and optimistic
//! writes. `StoreClient` is the session-scoped client surface the rest of
//! the system consumes; `StoreAdapter` layers the batched, auto-creating,
//! retrying access patterns on top; `MemoryStore` is an in-process
//! implementation with the same semantics, used by tests and demos.

mod adapter;
#[cfg(test)]
mod adapter_test;
mod memory;

pub use adapter::StoreAdapter;
pub use memory::{MemoryClient, MemoryStore};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::StoreResult;

/// Version wildcard meaning "write unconditionally".
pub const ANY_VERSION: i32 = -1;

/// Node metadata returned alongside reads.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stat {
    /// The node's data version, bumped on every write.
    pub version: i32,
    /// Whether the node is ephemeral.
    pub ephemeral: bool,
    /// Creation timestamp, millis since epoch.
    pub ctime_ms: i64,
    /// Last-modification timestamp, millis since epoch.
    pub mtime_ms: i64,
}

/// Node creation mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CreateMode {
    /// The node outlives the creating session.
    Persistent,
    /// The node is deleted when the creating session ends.
    Ephemeral,
}

/// A change notification delivered to a watch subscriber.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WatchEvent {
    /// Data at the path was created or changed.
    DataChanged(String),
    /// The node at the path was deleted.
    DataDeleted(String),
    /// The path's direct child set changed.
    ChildrenChanged(String),
}

/// A session-scoped client of the coordination store.
///
/// One client maps to one store session; ephemeral nodes created through a
/// client are torn down when its session ends. All paths are absolute.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// The id of this client's session.
    fn session_id(&self) -> &str;

    /// Create a node. The parent must exist.
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> StoreResult<()>;

    /// Read a node's data and stat.
    async fn get(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)>;

    /// Overwrite a node's data. `expected_version` of [`ANY_VERSION`] writes
    /// unconditionally; otherwise a mismatch fails with `VersionConflict`.
    async fn set(&self, path: &str, data: Vec<u8>, expected_version: i32) -> StoreResult<Stat>;

    /// Delete a leaf node, subject to the same version check as `set`.
    async fn delete(&self, path: &str, expected_version: i32) -> StoreResult<()>;

    /// Whether a node exists at the path.
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Read a node's stat without its data; `None` when absent.
    async fn get_stat(&self, path: &str) -> StoreResult<Option<Stat>>;

    /// Names (not paths) of the node's direct children, in lexical order.
    async fn get_children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Subscribe to data changes at a single path.
    async fn watch_data(&self, path: &str) -> StoreResult<mpsc::UnboundedReceiver<WatchEvent>>;

    /// Subscribe to child-set changes under a path.
    async fn watch_children(&self, path: &str) -> StoreResult<mpsc::UnboundedReceiver<WatchEvent>>;
}
