//! Stale-session garbage collection.
//!
//! Current-state records are scoped by session; once an instance comes back
//! under a new session, subtrees of older sessions are dead weight and are
//! removed here. Aggregation already ignores them, so GC is safe at any
//! point after a refresh.

use anyhow::{Context, Result};

use meson_core::keys;
use meson_core::store::{StoreAdapter, StoreClient};

use crate::cache::ClusterSnapshot;

pub async fn collect_stale_sessions<C: StoreClient>(
    adapter: &StoreAdapter<C>, snapshot: &ClusterSnapshot,
) -> Result<usize> {
    let mut collected = 0;
    for (instance, session) in &snapshot.stale_sessions {
        let path = keys::current_states_session(&snapshot.cluster, instance, session);
        tracing::debug!(instance = %instance, session = %session, "collecting stale current-state session");
        adapter
            .delete_recursive(&path)
            .await
            .context("error deleting stale current-state session")?;
        collected += 1;
    }
    Ok(collected)
}
