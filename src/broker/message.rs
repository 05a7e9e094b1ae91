//! Task message definition and wire codec.
//!
//! A `TaskMessage` is the immutable record moved between queues. Its JSON
//! encoding is also its identity inside the store: removal from the
//! in-progress list matches on the exact encoded bytes. Every message carries a
//! generated `id`, so two tasks with the same type and payload never alias.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::BrokerError;

/// String-keyed payload carried by a task.
pub type Payload = Map<String, Value>;

/// A unit of work to be delivered to a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Unique identifier assigned at creation.
    pub id: Uuid,
    /// Name of the handler that processes this task.
    #[serde(rename = "type")]
    pub kind: String,
    /// Handler arguments. `None` and an empty map are distinct and both
    /// survive a round trip through the store.
    #[serde(default)]
    pub payload: Option<Payload>,
}

impl TaskMessage {
    /// Creates a new task message with a fresh identifier.
    ///
    /// # Arguments
    ///
    /// * `kind` - Handler name
    /// * `payload` - Optional handler arguments
    pub fn new(kind: impl Into<String>, payload: Option<Payload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload,
        }
    }

    /// Creates a task message from a JSON object value.
    ///
    /// Non-object values (including `null`) produce a task without payload.
    pub fn from_json(kind: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => Some(map),
            _ => None,
        };
        Self::new(kind, payload)
    }

    /// Returns the payload value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }

    /// Encodes the message into its persisted form.
    pub fn encode(&self) -> Result<String, BrokerError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a persisted record back into a message.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Serialization` if the record is not a valid
    /// task message.
    pub fn decode(data: &str) -> Result<Self, BrokerError> {
        Ok(serde_json::from_str(data)?)
    }
}

impl std::fmt::Display for TaskMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}
