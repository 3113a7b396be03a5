//! Cluster data cache.
//!
//! Produces the immutable snapshot every pipeline run executes against.
//! Refresh reloads only subtrees whose store versions changed since the
//! previous refresh, batching reads through the adapter. A refresh which
//! fails to load any required subtree yields an error and publishes nothing,
//! so the pipeline aborts with no side effects.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use futures::future::join_all;

use meson_core::keys;
use meson_core::model::{
    ClusterConfig, CurrentState, ExternalView, IdealState, InstanceConfig, LiveInstance, Message, ResourceConfig,
    StateModelDefinition,
};
use meson_core::record::Record;
use meson_core::store::{StoreAdapter, StoreClient};

/// An immutable, consistent view of all pipeline inputs.
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    /// The cluster name.
    pub cluster: String,
    /// Cluster-level config.
    pub config: ClusterConfig,
    /// Per-resource config overrides.
    pub resource_configs: BTreeMap<String, ResourceConfig>,
    /// Configured participant instances.
    pub instance_configs: BTreeMap<String, InstanceConfig>,
    /// Live participant markers, keyed by instance name.
    pub live_instances: BTreeMap<String, LiveInstance>,
    /// Declarative resource targets.
    pub ideal_states: BTreeMap<String, IdealState>,
    /// Registered state-model definitions.
    pub state_model_defs: BTreeMap<String, StateModelDefinition>,
    /// Current-state records of live sessions: instance → resource → record.
    pub current_states: BTreeMap<String, BTreeMap<String, CurrentState>>,
    /// Outstanding messages per instance.
    pub messages: BTreeMap<String, Vec<Message>>,
    /// External views as last written.
    pub external_views: BTreeMap<String, ExternalView>,
    /// Stale current-state sessions discovered during refresh, for GC.
    pub stale_sessions: Vec<(String, String)>,
    /// When each non-live configured instance was last seen departing.
    pub offline_since: BTreeMap<String, i64>,
    /// Millis-since-epoch timestamp at which this snapshot was captured.
    pub captured_at_ms: i64,
}

impl ClusterSnapshot {
    /// The live session of an instance, when live.
    pub fn session_of(&self, instance: &str) -> Option<&str> {
        self.live_instances.get(instance).map(LiveInstance::session_id)
    }

    pub fn is_live(&self, instance: &str) -> bool {
        self.live_instances.contains_key(instance)
    }

    /// Whether the instance is live, or departed recently enough that
    /// delayed rebalancing still treats it as live.
    pub fn effectively_live(&self, instance: &str) -> bool {
        if self.is_live(instance) {
            return true;
        }
        let delay = self.config.delay_rebalance_ms();
        if delay <= 0 {
            return false;
        }
        self.offline_since
            .get(instance)
            .map(|since| since + delay > self.captured_at_ms)
            .unwrap_or(false)
    }

    /// The earliest delayed-rebalance expiry still in the future, if any.
    pub fn earliest_delay_expiry_ms(&self) -> Option<i64> {
        let delay = self.config.delay_rebalance_ms();
        if delay <= 0 {
            return None;
        }
        self.offline_since
            .values()
            .map(|since| since + delay)
            .filter(|expiry| *expiry > self.captured_at_ms)
            .min()
    }

    pub fn state_model(&self, name: &str) -> Option<&StateModelDefinition> {
        self.state_model_defs.get(name)
    }

    /// Whether the instance may hold replicas at all.
    pub fn is_instance_enabled(&self, instance: &str) -> bool {
        self.instance_configs.get(instance).map(InstanceConfig::enabled).unwrap_or(false)
    }
}

/// The cache through which the controller reads cluster metadata.
pub struct ClusterDataCache<C: StoreClient> {
    adapter: StoreAdapter<C>,
    cluster: String,
    /// Per-path version hints for selective re-reads.
    record_cache: HashMap<String, (i32, Record)>,
    /// Offline timestamps carried across refreshes.
    offline_since: BTreeMap<String, i64>,
    /// The latest published snapshot.
    published: ArcSwapOption<ClusterSnapshot>,
}

impl<C: StoreClient> ClusterDataCache<C> {
    pub fn new(adapter: StoreAdapter<C>, cluster: impl Into<String>) -> Self {
        Self {
            adapter,
            cluster: cluster.into(),
            record_cache: HashMap::new(),
            offline_since: BTreeMap::new(),
            published: ArcSwapOption::const_empty(),
        }
    }

    /// The latest published snapshot, if a refresh has completed.
    pub fn current(&self) -> Option<Arc<ClusterSnapshot>> {
        self.published.load_full()
    }

    /// Reload changed subtrees and publish a fresh snapshot.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn refresh(&mut self) -> Result<Arc<ClusterSnapshot>> {
        let cluster = self.cluster.clone();
        let captured_at_ms = Utc::now().timestamp_millis();

        let config = self
            .adapter
            .get_record(&keys::cluster_config(&cluster))
            .await
            .context("error reading cluster config")?
            .map(|(record, _)| ClusterConfig::from_record(record))
            .context("cluster config record is missing")?;

        let resource_configs = self
            .read_dir(&keys::resource_configs(&cluster))
            .await
            .context("error reading resource configs")?
            .into_iter()
            .map(|(name, record)| (name, ResourceConfig::from_record(record)))
            .collect();
        let instance_configs: BTreeMap<String, InstanceConfig> = self
            .read_dir(&keys::participant_configs(&cluster))
            .await
            .context("error reading participant configs")?
            .into_iter()
            .map(|(name, record)| (name, InstanceConfig::from_record(record)))
            .collect();
        let live_instances: BTreeMap<String, LiveInstance> = self
            .read_dir(&keys::live_instances(&cluster))
            .await
            .context("error reading live instances")?
            .into_iter()
            .map(|(name, record)| (name, LiveInstance::from_record(record)))
            .collect();
        let ideal_states = self
            .read_dir(&keys::ideal_states(&cluster))
            .await
            .context("error reading ideal states")?
            .into_iter()
            .map(|(name, record)| (name, IdealState::from_record(record)))
            .collect();
        let state_model_defs = self
            .read_dir(&keys::state_model_defs(&cluster))
            .await
            .context("error reading state model definitions")?
            .into_iter()
            .map(|(name, record)| (name, StateModelDefinition::from_record(record)))
            .collect();
        let external_views = self
            .read_dir(&keys::external_views(&cluster))
            .await
            .context("error reading external views")?
            .into_iter()
            .map(|(name, record)| (name, ExternalView::from_record(record)))
            .collect();

        // Current states are scoped by each live instance's session; any
        // other session subtree found is stale and queued for GC.
        let mut current_states = BTreeMap::new();
        let mut stale_sessions = Vec::new();
        for (instance, live) in &live_instances {
            let session = live.session_id();
            let sessions = self
                .adapter
                .get_children(&keys::current_states(&cluster, instance))
                .await
                .context("error listing current-state sessions")?;
            for have in sessions {
                if have != session {
                    stale_sessions.push((instance.clone(), have));
                }
            }
            let records = self
                .read_dir(&keys::current_states_session(&cluster, instance, session))
                .await
                .context("error reading current states")?;
            let states: BTreeMap<String, CurrentState> = records
                .into_iter()
                .map(|(resource, record)| (resource, CurrentState::from_record(record)))
                .collect();
            current_states.insert(instance.clone(), states);
        }

        // Outstanding message queues of live instances.
        let mut messages = BTreeMap::new();
        for instance in live_instances.keys() {
            let records = self
                .read_dir(&keys::messages(&cluster, instance))
                .await
                .context("error reading message queues")?;
            let mut queue: Vec<Message> = records.into_values().map(Message::from_record).collect();
            queue.sort_by_key(Message::create_timestamp);
            messages.insert(instance.clone(), queue);
        }

        // Track departures for delayed rebalancing.
        for instance in instance_configs.keys() {
            if live_instances.contains_key(instance) {
                self.offline_since.remove(instance);
            } else {
                self.offline_since.entry(instance.clone()).or_insert(captured_at_ms);
            }
        }
        self.offline_since.retain(|instance, _| instance_configs.contains_key(instance));

        let snapshot = Arc::new(ClusterSnapshot {
            cluster,
            config,
            resource_configs,
            instance_configs,
            live_instances,
            ideal_states,
            state_model_defs,
            current_states,
            messages,
            external_views,
            stale_sessions,
            offline_since: self.offline_since.clone(),
            captured_at_ms,
        });
        self.published.store(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Read all records under a directory, re-fetching only entries whose
    /// store version differs from the cached hint. Deleted entries are
    /// evicted from the hint cache.
    async fn read_dir(&mut self, dir: &str) -> Result<BTreeMap<String, Record>> {
        let children = self.adapter.get_children(dir).await?;
        let paths: Vec<String> = children.iter().map(|child| format!("{}/{}", dir, child)).collect();

        // Evict hints for entries no longer present.
        let prefix = format!("{}/", dir);
        self.record_cache
            .retain(|path, _| !(path.starts_with(&prefix) && !path[prefix.len()..].contains('/')) || paths.contains(path));

        let stats = join_all(paths.iter().map(|path| self.adapter.get_stat(path))).await;
        let mut to_fetch = Vec::new();
        for (path, stat) in paths.iter().zip(stats) {
            let stat = stat?;
            match (stat, self.record_cache.get(path)) {
                (Some(stat), Some((version, _))) if stat.version == *version => {}
                (Some(_), _) => to_fetch.push(path.clone()),
                // Deleted between list and stat; drop the hint.
                (None, _) => {
                    self.record_cache.remove(path);
                }
            }
        }

        let fetched = self.adapter.multi_get(&to_fetch).await?;
        for (path, entry) in to_fetch.into_iter().zip(fetched) {
            match entry {
                Some((record, stat)) => {
                    self.record_cache.insert(path, (stat.version, record));
                }
                None => {
                    self.record_cache.remove(&path);
                }
            }
        }

        let mut out = BTreeMap::new();
        for (child, path) in children.into_iter().zip(paths) {
            if let Some((_, record)) = self.record_cache.get(&path) {
                out.insert(child, record.clone());
            }
        }
        Ok(out)
    }

    /// Directories the pipeline driver should hold child watches on, given
    /// the current membership.
    pub fn watch_dirs(&self) -> Vec<String> {
        let cluster = &self.cluster;
        let mut dirs = vec![
            keys::live_instances(cluster),
            keys::ideal_states(cluster),
            keys::participant_configs(cluster),
            keys::resource_configs(cluster),
            keys::state_model_defs(cluster),
        ];
        if let Some(snapshot) = self.current() {
            for (instance, live) in &snapshot.live_instances {
                dirs.push(keys::messages(cluster, instance));
                dirs.push(keys::current_states_session(cluster, instance, live.session_id()));
            }
        }
        dirs
    }

    /// Data paths the pipeline driver should hold data watches on.
    pub fn watch_data_paths(&self) -> Vec<String> {
        let cluster = &self.cluster;
        let mut paths = vec![keys::cluster_config(cluster)];
        if let Some(snapshot) = self.current() {
            for (instance, states) in &snapshot.current_states {
                let session = match snapshot.session_of(instance) {
                    Some(session) => session,
                    None => continue,
                };
                for resource in states.keys() {
                    paths.push(keys::current_state(cluster, instance, session, resource));
                }
            }
        }
        paths
    }
}
