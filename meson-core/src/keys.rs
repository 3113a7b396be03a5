//! The coordination-store path layout for a Meson cluster.
//!
//! All persistent entities live under the cluster root `/{cluster}`. These
//! helpers are the single source of truth for that layout; nothing else in
//! the codebase builds store paths by hand.

/// Directory of cluster-scoped config records.
pub const DIR_CONFIGS_CLUSTER: &str = "CONFIGS/CLUSTER";
/// Directory of participant config records.
pub const DIR_CONFIGS_PARTICIPANT: &str = "CONFIGS/PARTICIPANT";
/// Directory of resource config records.
pub const DIR_CONFIGS_RESOURCE: &str = "CONFIGS/RESOURCE";
/// Directory of ephemeral live-instance markers.
pub const DIR_LIVE_INSTANCES: &str = "LIVEINSTANCES";
/// Directory of ideal-state records.
pub const DIR_IDEAL_STATES: &str = "IDEALSTATES";
/// Directory of per-instance state.
pub const DIR_INSTANCES: &str = "INSTANCES";
/// Directory of external-view records.
pub const DIR_EXTERNAL_VIEW: &str = "EXTERNALVIEW";
/// Directory of state-model definitions.
pub const DIR_STATE_MODEL_DEFS: &str = "STATEMODELDEFS";
/// The controller subtree.
pub const DIR_CONTROLLER: &str = "CONTROLLER";

/// The cluster root path.
pub fn cluster_root(cluster: &str) -> String {
    format!("/{}", cluster)
}

/// Path of the cluster config record.
pub fn cluster_config(cluster: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_CONFIGS_CLUSTER, cluster)
}

/// Directory of participant configs.
pub fn participant_configs(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_CONFIGS_PARTICIPANT)
}

/// Path of a participant config record.
pub fn participant_config(cluster: &str, instance: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_CONFIGS_PARTICIPANT, instance)
}

/// Directory of resource configs.
pub fn resource_configs(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_CONFIGS_RESOURCE)
}

/// Path of a resource config record.
pub fn resource_config(cluster: &str, resource: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_CONFIGS_RESOURCE, resource)
}

/// Directory of live-instance markers.
pub fn live_instances(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_LIVE_INSTANCES)
}

/// Path of a live-instance marker.
pub fn live_instance(cluster: &str, instance: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_LIVE_INSTANCES, instance)
}

/// Directory of ideal states.
pub fn ideal_states(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_IDEAL_STATES)
}

/// Path of a resource's ideal state.
pub fn ideal_state(cluster: &str, resource: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_IDEAL_STATES, resource)
}

/// Directory of all instance subtrees.
pub fn instances(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_INSTANCES)
}

/// Root of an instance's subtree.
pub fn instance(cluster: &str, instance: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_INSTANCES, instance)
}

/// Directory of an instance's current-state sessions.
pub fn current_states(cluster: &str, instance: &str) -> String {
    format!("/{}/{}/{}/CURRENTSTATES", cluster, DIR_INSTANCES, instance)
}

/// Directory of an instance's current states for one session.
pub fn current_states_session(cluster: &str, instance: &str, session: &str) -> String {
    format!("/{}/{}/{}/CURRENTSTATES/{}", cluster, DIR_INSTANCES, instance, session)
}

/// Path of an instance's current-state record for one resource.
pub fn current_state(cluster: &str, instance: &str, session: &str, resource: &str) -> String {
    format!("/{}/{}/{}/CURRENTSTATES/{}/{}", cluster, DIR_INSTANCES, instance, session, resource)
}

/// Directory of an instance's inbound message queue.
pub fn messages(cluster: &str, instance: &str) -> String {
    format!("/{}/{}/{}/MESSAGES", cluster, DIR_INSTANCES, instance)
}

/// Path of one message in an instance's queue.
pub fn message(cluster: &str, instance: &str, msg_id: &str) -> String {
    format!("/{}/{}/{}/MESSAGES/{}", cluster, DIR_INSTANCES, instance, msg_id)
}

/// Directory of external views.
pub fn external_views(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_EXTERNAL_VIEW)
}

/// Path of a resource's external view.
pub fn external_view(cluster: &str, resource: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_EXTERNAL_VIEW, resource)
}

/// Directory of state-model definitions.
pub fn state_model_defs(cluster: &str) -> String {
    format!("/{}/{}", cluster, DIR_STATE_MODEL_DEFS)
}

/// Path of a state-model definition.
pub fn state_model_def(cluster: &str, name: &str) -> String {
    format!("/{}/{}/{}", cluster, DIR_STATE_MODEL_DEFS, name)
}

/// Path of the controller leader marker.
pub fn controller_leader(cluster: &str) -> String {
    format!("/{}/{}/LEADER", cluster, DIR_CONTROLLER)
}

/// The set of directories materialized when a cluster is created.
pub fn cluster_skeleton(cluster: &str) -> Vec<String> {
    vec![
        format!("/{}/{}", cluster, DIR_CONFIGS_CLUSTER),
        format!("/{}/{}", cluster, DIR_CONFIGS_PARTICIPANT),
        format!("/{}/{}", cluster, DIR_CONFIGS_RESOURCE),
        format!("/{}/{}", cluster, DIR_LIVE_INSTANCES),
        format!("/{}/{}", cluster, DIR_IDEAL_STATES),
        format!("/{}/{}", cluster, DIR_INSTANCES),
        format!("/{}/{}", cluster, DIR_EXTERNAL_VIEW),
        format!("/{}/{}", cluster, DIR_STATE_MODEL_DEFS),
        format!("/{}/{}", cluster, DIR_CONTROLLER),
    ]
}

/// Get the parent path of the given path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        if path.len() > 1 {
            Some("/")
        } else {
            None
        }
    } else {
        Some(&path[..idx])
    }
}

/// Get the final path segment of the given path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
