//! The participant executor.
//!
//! Consumes inbound messages, binds each to the state-model handler for its
//! (resource, partition), invokes the user transition, and writes the
//! resulting current state back to the store before deleting the message.
//! Handler failures mark the replica ERROR; they never block other
//! partitions.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::timeout;

use meson_core::keys;
use meson_core::model::{CurrentState, Message, MessageType, StateModelDefinition, DROPPED_STATE, ERROR_STATE};
use meson_core::store::{StoreAdapter, StoreClient};

use crate::config::Config;
use crate::dispatcher::{KeyedDispatcher, TaskKey};
use crate::state_model::{StateModel, StateModelRegistry};

const METRIC_TRANSITIONS_COMPLETED: &str = "meson_participant_transitions_completed";
const METRIC_TRANSITIONS_FAILED: &str = "meson_participant_transitions_failed";
const METRIC_TRANSITION_TIMEOUTS: &str = "meson_participant_transition_timeouts";
const METRIC_STALE_MESSAGES: &str = "meson_participant_stale_messages";

type Handler = Arc<Mutex<Box<dyn StateModel>>>;

/// The executor bound to one participant session.
pub struct ParticipantExecutor<C: StoreClient> {
    config: Arc<Config>,
    adapter: StoreAdapter<C>,
    session: String,
    registry: StateModelRegistry,
    dispatcher: KeyedDispatcher,
    /// Handler instances keyed by replica, cached for the replica's lifetime.
    handlers: DashMap<TaskKey, Handler>,
    /// State-model definitions read from the store, cached forever; they
    /// are immutable after registration.
    state_models: DashMap<String, Arc<StateModelDefinition>>,
    /// Ids of transitions cancelled before they started.
    cancelled: DashMap<String, ()>,
}

impl<C: StoreClient> ParticipantExecutor<C> {
    pub fn new(config: Arc<Config>, adapter: StoreAdapter<C>, registry: StateModelRegistry) -> Arc<Self> {
        metrics::register_counter!(METRIC_TRANSITIONS_COMPLETED, metrics::Unit::Count, "state transitions completed");
        metrics::register_counter!(METRIC_TRANSITIONS_FAILED, metrics::Unit::Count, "state transitions failed by handlers");
        metrics::register_counter!(METRIC_TRANSITION_TIMEOUTS, metrics::Unit::Count, "state transitions promoted to ERROR on timeout");
        metrics::register_counter!(METRIC_STALE_MESSAGES, metrics::Unit::Count, "messages discarded as stale");
        let session = adapter.session_id().to_string();
        Arc::new(Self {
            dispatcher: KeyedDispatcher::new(config.executor_workers),
            config,
            adapter,
            session,
            registry,
            handlers: DashMap::new(),
            state_models: DashMap::new(),
            cancelled: DashMap::new(),
        })
    }

    /// The session this executor publishes under.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Route one inbound message. Transitions serialize per replica;
    /// everything else is handled out of band.
    pub fn submit(self: &Arc<Self>, msg: Message) {
        match msg.msg_type() {
            Some(MessageType::StateTransition) => {
                let key = (msg.resource().to_string(), msg.partition().to_string());
                let this = self.clone();
                self.dispatcher.submit(key, async move {
                    this.process_transition(msg).await;
                });
            }
            Some(MessageType::Cancellation) => {
                // Mark before enqueueing so a not-yet-started transition is
                // skipped when its turn comes.
                if let Some(target) = msg.msg_subtype() {
                    self.cancelled.insert(target.to_string(), ());
                }
                let key = (msg.resource().to_string(), msg.partition().to_string());
                let this = self.clone();
                self.dispatcher.submit(key, async move {
                    this.process_cancellation(msg).await;
                });
            }
            _ => {
                tracing::debug!(msg_id = %msg.id(), msg_type = ?msg.msg_type(), "discarding unsupported message type");
                let this = self.clone();
                tokio::spawn(async move {
                    let _ = this.delete_message(&msg).await;
                });
            }
        }
    }

    /// Process one state-transition message end to end.
    #[tracing::instrument(level = "debug", skip(self, msg), fields(msg_id = %msg.id(), resource = %msg.resource(), partition = %msg.partition()))]
    async fn process_transition(self: Arc<Self>, msg: Message) {
        // Skipped by a cancellation which arrived ahead of execution.
        if self.cancelled.remove(msg.id()).is_some() {
            tracing::debug!("transition cancelled before execution");
            if let Some(handler) = self.handlers.get(&key_of(&msg)).map(|have| have.value().clone()) {
                handler.lock().await.on_cancel(&msg).await;
            }
            let res = self.clear_requested_state(&msg).await;
            if let Err(err) = res.and(self.delete_message(&msg).await) {
                tracing::error!(error = ?err, "error cleaning up cancelled transition");
            }
            return;
        }

        // Session & from-state validation against the authoritative record.
        if msg.tgt_session_id() != self.session {
            tracing::warn!(expected = %self.session, got = %msg.tgt_session_id(), "message targets a stale session");
            metrics::increment_counter!(METRIC_STALE_MESSAGES);
            let _ = self.delete_message(&msg).await;
            return;
        }
        let current = match self.read_current_state(&msg).await {
            Ok(current) => current,
            Err(err) => {
                tracing::error!(error = ?err, "error reading current state, leaving message for retry");
                return;
            }
        };
        if current != msg.from_state() {
            tracing::warn!(current = %current, from = %msg.from_state(), "from-state mismatch, discarding stale message");
            metrics::increment_counter!(METRIC_STALE_MESSAGES);
            let _ = self.delete_message(&msg).await;
            return;
        }

        let handler = match self.handler_for(&msg) {
            Some(handler) => handler,
            None => {
                tracing::error!(state_model = %msg.state_model_def(), "no state-model factory registered, marking replica ERROR");
                let _ = self.mark_error(&msg).await;
                let _ = self.delete_message(&msg).await;
                return;
            }
        };

        // Record when execution actually began, best effort.
        let start_path = keys::message(&self.config.cluster, &self.config.instance, msg.id());
        if let Ok(Some((record, _))) = self.adapter.get_record(&start_path).await {
            let mut updated = Message::from_record(record);
            updated.set_execute_start_timestamp(Utc::now().timestamp_millis());
            let _ = self.adapter.set_record(&start_path, updated.record()).await;
        }

        let outcome = self.invoke_handler(&handler, &msg).await;
        match outcome {
            Invocation::Completed(info) => {
                metrics::increment_counter!(METRIC_TRANSITIONS_COMPLETED);
                if let Err(err) = self.publish_success(&msg, info).await {
                    tracing::error!(error = ?err, "error publishing current state");
                    return;
                }
            }
            Invocation::Failed(err) => {
                tracing::error!(error = ?err, "handler failed, marking replica ERROR");
                metrics::increment_counter!(METRIC_TRANSITIONS_FAILED);
                if let Err(err) = self.mark_error(&msg).await {
                    tracing::error!(error = ?err, "error marking replica ERROR");
                    return;
                }
            }
            Invocation::TimedOut => {
                tracing::error!(timeout_ms = ?msg.timeout_ms(), "handler timed out, marking replica ERROR");
                metrics::increment_counter!(METRIC_TRANSITION_TIMEOUTS);
                let grace = Duration::from_millis(self.config.cancel_grace_ms);
                let _ = timeout(grace, async { handler.lock().await.on_cancel(&msg).await }).await;
                if let Err(err) = self.mark_error(&msg).await {
                    tracing::error!(error = ?err, "error marking replica ERROR");
                    return;
                }
            }
        }
        if let Err(err) = self.delete_message(&msg).await {
            tracing::error!(error = ?err, "error deleting completed message");
        }
    }

    /// Process a cancellation whose transition already ran, or is running:
    /// nothing to unwind, the controller reconciles from observed state.
    async fn process_cancellation(self: Arc<Self>, msg: Message) {
        self.cancelled.remove(msg.msg_subtype().unwrap_or_default());
        if let Err(err) = self.delete_message(&msg).await {
            tracing::error!(error = ?err, "error deleting cancellation message");
        }
    }

    /// Invoke the transition, honoring the message's handler timeout.
    async fn invoke_handler(&self, handler: &Handler, msg: &Message) -> Invocation {
        let fut = async {
            let mut guard = handler.lock().await;
            // Re-initialize a replica coming back from ERROR.
            if msg.from_state() == ERROR_STATE {
                guard.on_reset().await;
            }
            guard.on_transition(msg.from_state(), msg.to_state(), msg).await
        };
        match msg.timeout_ms() {
            Some(millis) => match timeout(Duration::from_millis(millis), fut).await {
                Ok(Ok(info)) => Invocation::Completed(info),
                Ok(Err(err)) => Invocation::Failed(err),
                Err(_) => Invocation::TimedOut,
            },
            None => match fut.await {
                Ok(info) => Invocation::Completed(info),
                Err(err) => Invocation::Failed(err),
            },
        }
    }

    /// Get or create the handler bound to the message's replica.
    fn handler_for(&self, msg: &Message) -> Option<Handler> {
        let key = key_of(msg);
        if let Some(handler) = self.handlers.get(&key) {
            return Some(handler.value().clone());
        }
        let factory = self.registry.get(msg.state_model_def())?;
        let handler: Handler = Arc::new(Mutex::new(factory.create(msg.resource(), msg.partition())));
        self.handlers.insert(key, handler.clone());
        Some(handler)
    }

    /// The replica's current state per the store, or the model's initial
    /// state when it has never reported.
    async fn read_current_state(&self, msg: &Message) -> Result<String> {
        let path = keys::current_state(&self.config.cluster, &self.config.instance, &self.session, msg.resource());
        let record = self.adapter.get_record(&path).await.context("error reading current state record")?;
        if let Some((record, _)) = record {
            let current = CurrentState::from_record(record);
            if let Some(state) = current.state(msg.partition()) {
                return Ok(state.to_string());
            }
        }
        let smd = self.state_model(msg.state_model_def()).await?;
        Ok(smd.initial_state().to_string())
    }

    async fn state_model(&self, name: &str) -> Result<Arc<StateModelDefinition>> {
        if let Some(smd) = self.state_models.get(name) {
            return Ok(smd.value().clone());
        }
        let path = keys::state_model_def(&self.config.cluster, name);
        let (record, _) = self
            .adapter
            .get_record(&path)
            .await
            .context("error reading state model definition")?
            .context("state model definition is not registered")?;
        let smd = Arc::new(StateModelDefinition::from_record(record));
        self.state_models.insert(name.to_string(), smd.clone());
        Ok(smd)
    }

    /// Publish a completed transition: the new state and optional info,
    /// with the in-flight marker cleared.
    async fn publish_success(&self, msg: &Message, info: Option<String>) -> Result<()> {
        let dropped = msg.to_state() == DROPPED_STATE;
        self.write_current_state(msg, move |state, partition| {
            if dropped {
                state.remove_partition(partition);
            } else {
                state.set_state(partition, msg.to_state());
                if let Some(info) = &info {
                    state.set_info(partition, info.clone());
                }
                state.clear_requested_state(partition);
            }
        })
        .await?;
        if dropped {
            let key = key_of(msg);
            self.handlers.remove(&key);
            self.dispatcher.retire(&key);
        }
        Ok(())
    }

    /// Record a handler failure as ERROR on the replica.
    async fn mark_error(&self, msg: &Message) -> Result<()> {
        self.write_current_state(msg, |state, partition| {
            state.set_state(partition, ERROR_STATE);
            state.clear_requested_state(partition);
        })
        .await
    }

    async fn clear_requested_state(&self, msg: &Message) -> Result<()> {
        self.write_current_state(msg, |state, partition| {
            state.clear_requested_state(partition);
        })
        .await
    }

    async fn write_current_state<F>(&self, msg: &Message, apply: F) -> Result<()>
    where
        F: Fn(&mut CurrentState, &str) + Send + Sync,
    {
        let path = keys::current_state(&self.config.cluster, &self.config.instance, &self.session, msg.resource());
        let (resource, session, model, partition) = (
            msg.resource().to_string(),
            self.session.clone(),
            msg.state_model_def().to_string(),
            msg.partition().to_string(),
        );
        self.adapter
            .update(&path, move |record| {
                let mut state = match record {
                    Some(record) => CurrentState::from_record(record),
                    None => CurrentState::new(resource.clone(), session.clone(), model.clone()),
                };
                apply(&mut state, &partition);
                state.into_record()
            })
            .await
            .context("error writing current state record")?;
        Ok(())
    }

    async fn delete_message(&self, msg: &Message) -> Result<()> {
        self.adapter
            .delete(&keys::message(&self.config.cluster, &self.config.instance, msg.id()))
            .await
            .context("error deleting message")?;
        Ok(())
    }
}

enum Invocation {
    Completed(Option<String>),
    Failed(anyhow::Error),
    TimedOut,
}

fn key_of(msg: &Message) -> TaskKey {
    (msg.resource().to_string(), msg.partition().to_string())
}
