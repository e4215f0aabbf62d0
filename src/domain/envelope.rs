//! The wire envelope: the unit of WebSocket communication.
//!
//! An envelope is a JSON object with a small reserved field set; `data` is
//! carried opaquely and never interpreted by the core. Any client-supplied
//! `id`, `from`, or `timestamp` is overwritten when the server stamps the
//! envelope for delivery.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::error::EnvelopeError;
use super::value_object::{ConnectionId, MessageId};

/// Sentinel `from` value for frames originated by the server itself.
pub const SERVER_SENTINEL: &str = "server";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Server-stamped JSON envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type; dispatch key
    pub r#type: String,
    /// Message identifier, assigned by the server on delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Originating connection id, or [`SERVER_SENTINEL`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Unicast target connection id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Epoch milliseconds, assigned by the server on delivery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Client-chosen sequence number, echoed back in replies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<Number>,
    /// Ask the distributor to skip the originator on a broadcast
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude_self: bool,
    /// Opaque payload
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Unknown top-level fields, preserved but never interpreted
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// New envelope of the given type with no payload.
    pub fn of(kind: &str) -> Self {
        Self {
            r#type: kind.to_string(),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_seq(mut self, seq: Option<Number>) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_to(mut self, to: String) -> Self {
        self.to = Some(to);
        self
    }

    /// Mark the envelope as originated by the server.
    pub fn from_server(mut self) -> Self {
        self.from = Some(SERVER_SENTINEL.to_string());
        self
    }

    /// Mark the envelope as originated by the given connection.
    pub fn from_client(mut self, uid: ConnectionId) -> Self {
        self.from = Some(uid.to_string());
        self
    }

    /// Decode an inbound text frame.
    ///
    /// Frames that are not JSON objects, lack a `type`, or carry a
    /// non-numeric `seq` are all rejected as malformed.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Overwrite the server-owned stamp fields.
    pub fn stamp(&mut self, id: MessageId, timestamp: i64) {
        self.id = Some(id.to_string());
        self.timestamp = Some(timestamp);
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}
