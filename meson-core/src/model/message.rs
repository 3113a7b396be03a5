//! The controller→participant message wire format.

use chrono::Utc;
use uuid::Uuid;

use crate::record::Record;

const FIELD_MSG_TYPE: &str = "MSG_TYPE";
const FIELD_MSG_SUBTYPE: &str = "MSG_SUBTYPE";
const FIELD_SRC_NAME: &str = "SRC_NAME";
const FIELD_TGT_NAME: &str = "TGT_NAME";
const FIELD_TGT_SESSION_ID: &str = "TGT_SESSION_ID";
const FIELD_RESOURCE_NAME: &str = "RESOURCE_NAME";
const FIELD_PARTITION_NAME: &str = "PARTITION_NAME";
const FIELD_STATE_MODEL_DEF: &str = "STATE_MODEL_DEF";
const FIELD_FROM_STATE: &str = "FROM_STATE";
const FIELD_TO_STATE: &str = "TO_STATE";
const FIELD_CREATE_TIMESTAMP: &str = "CREATE_TIMESTAMP";
const FIELD_EXECUTE_START_TIMESTAMP: &str = "EXECUTE_START_TIMESTAMP";
const FIELD_RETRY_COUNT: &str = "RETRY_COUNT";
const FIELD_TIMEOUT: &str = "TIMEOUT";

/// Message type variants.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    StateTransition,
    TaskReply,
    Cancellation,
    NoOp,
    Shutdown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::StateTransition => "STATE_TRANSITION",
            MessageType::TaskReply => "TASK_REPLY",
            MessageType::Cancellation => "CANCELLATION",
            MessageType::NoOp => "NO_OP",
            MessageType::Shutdown => "SHUTDOWN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "STATE_TRANSITION" => Some(MessageType::StateTransition),
            "TASK_REPLY" => Some(MessageType::TaskReply),
            "CANCELLATION" => Some(MessageType::Cancellation),
            "NO_OP" => Some(MessageType::NoOp),
            "SHUTDOWN" => Some(MessageType::Shutdown),
            _ => None,
        }
    }
}

/// A message created by the controller and consumed by a participant.
#[derive(Clone, Debug)]
pub struct Message {
    record: Record,
}

impl Message {
    /// Create a state-transition message for one (instance, partition).
    #[allow(clippy::too_many_arguments)]
    pub fn new_state_transition(
        src: &str, tgt_instance: &str, tgt_session: &str, resource: &str, partition: &str, state_model_def: &str,
        from_state: &str, to_state: &str,
    ) -> Self {
        let mut record = Record::new(Uuid::new_v4().to_string());
        record.set_simple(FIELD_MSG_TYPE, MessageType::StateTransition.as_str());
        record.set_simple(FIELD_SRC_NAME, src);
        record.set_simple(FIELD_TGT_NAME, tgt_instance);
        record.set_simple(FIELD_TGT_SESSION_ID, tgt_session);
        record.set_simple(FIELD_RESOURCE_NAME, resource);
        record.set_simple(FIELD_PARTITION_NAME, partition);
        record.set_simple(FIELD_STATE_MODEL_DEF, state_model_def);
        record.set_simple(FIELD_FROM_STATE, from_state);
        record.set_simple(FIELD_TO_STATE, to_state);
        record.set_i64(FIELD_CREATE_TIMESTAMP, Utc::now().timestamp_millis());
        record.set_simple(FIELD_RETRY_COUNT, "0");
        Self { record }
    }

    /// Create a cancellation superseding the given pending message.
    pub fn new_cancellation(src: &str, pending: &Message) -> Self {
        let mut record = Record::new(Uuid::new_v4().to_string());
        record.set_simple(FIELD_MSG_TYPE, MessageType::Cancellation.as_str());
        // The subtype carries the id of the message being cancelled.
        record.set_simple(FIELD_MSG_SUBTYPE, pending.id());
        record.set_simple(FIELD_SRC_NAME, src);
        record.set_simple(FIELD_TGT_NAME, pending.tgt_name());
        record.set_simple(FIELD_TGT_SESSION_ID, pending.tgt_session_id());
        record.set_simple(FIELD_RESOURCE_NAME, pending.resource());
        record.set_simple(FIELD_PARTITION_NAME, pending.partition());
        record.set_simple(FIELD_STATE_MODEL_DEF, pending.state_model_def());
        record.set_simple(FIELD_FROM_STATE, pending.from_state());
        record.set_simple(FIELD_TO_STATE, pending.to_state());
        record.set_i64(FIELD_CREATE_TIMESTAMP, Utc::now().timestamp_millis());
        record.set_simple(FIELD_RETRY_COUNT, "0");
        Self { record }
    }

    pub fn from_record(record: Record) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn msg_type(&self) -> Option<MessageType> {
        self.record.get_simple(FIELD_MSG_TYPE).and_then(MessageType::parse)
    }

    /// For cancellations, the id of the superseded message.
    pub fn msg_subtype(&self) -> Option<&str> {
        self.record.get_simple(FIELD_MSG_SUBTYPE)
    }

    pub fn src_name(&self) -> &str {
        self.record.get_simple(FIELD_SRC_NAME).unwrap_or("")
    }

    pub fn tgt_name(&self) -> &str {
        self.record.get_simple(FIELD_TGT_NAME).unwrap_or("")
    }

    /// The participant session this message is valid for.
    pub fn tgt_session_id(&self) -> &str {
        self.record.get_simple(FIELD_TGT_SESSION_ID).unwrap_or("")
    }

    pub fn resource(&self) -> &str {
        self.record.get_simple(FIELD_RESOURCE_NAME).unwrap_or("")
    }

    pub fn partition(&self) -> &str {
        self.record.get_simple(FIELD_PARTITION_NAME).unwrap_or("")
    }

    pub fn state_model_def(&self) -> &str {
        self.record.get_simple(FIELD_STATE_MODEL_DEF).unwrap_or("")
    }

    pub fn from_state(&self) -> &str {
        self.record.get_simple(FIELD_FROM_STATE).unwrap_or("")
    }

    pub fn to_state(&self) -> &str {
        self.record.get_simple(FIELD_TO_STATE).unwrap_or("")
    }

    pub fn create_timestamp(&self) -> i64 {
        self.record.get_i64(FIELD_CREATE_TIMESTAMP).unwrap_or(0)
    }

    pub fn execute_start_timestamp(&self) -> Option<i64> {
        self.record.get_i64(FIELD_EXECUTE_START_TIMESTAMP)
    }

    pub fn set_execute_start_timestamp(&mut self, ts: i64) {
        self.record.set_i64(FIELD_EXECUTE_START_TIMESTAMP, ts);
    }

    pub fn retry_count(&self) -> u32 {
        self.record.get_simple(FIELD_RETRY_COUNT).and_then(|val| val.parse().ok()).unwrap_or(0)
    }

    /// Handler timeout in milliseconds, if the message carries one.
    pub fn timeout_ms(&self) -> Option<u64> {
        self.record.get_simple(FIELD_TIMEOUT).and_then(|val| val.parse().ok())
    }

    pub fn set_timeout_ms(&mut self, millis: u64) {
        self.record.set_simple(FIELD_TIMEOUT, millis.to_string());
    }
}
