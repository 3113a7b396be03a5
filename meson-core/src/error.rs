//! Meson error abstractions.

use thiserror::Error;

/// Error variants which may be returned from the coordination store.
///
/// These are error kinds, deliberately distinct from whatever exception
/// surface the backing store implementation has. Callers branch on kind,
/// never on backend detail.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The target node does not exist.
    #[error("node not found: {0}")]
    NotFound(String),
    /// A node already exists at the target path.
    #[error("node already exists: {0}")]
    NodeExists(String),
    /// The target node still has children and cannot be deleted.
    #[error("node not empty: {0}")]
    NotEmpty(String),
    /// The expected version did not match the node's current version.
    #[error("version conflict at {path}: expected {expected}, actual {actual}")]
    VersionConflict { path: String, expected: i32, actual: i32 },
    /// The client's session is no longer valid.
    #[error("store session expired")]
    SessionExpired,
    /// A transient failure (connection loss, timeout); safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),
    /// The store returned data which could not be deserialized.
    #[error("malformed data at {path}: {source}")]
    MalformedData {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether the error is safe to retry at the adapter level.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// A result type used for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The error type used to indicate that a system shutdown is required.
#[derive(Debug, Error)]
#[error("fatal error: {0}")]
pub struct ShutdownError(#[from] pub anyhow::Error);

/// A result type where the error is a `ShutdownError`.
pub type ShutdownResult<T> = std::result::Result<T, ShutdownError>;
