//! chatinterface wire messages.
//!
//! Every frame on the chat socket is a JSON object `{"event": ..., "data": ...}`.
//! The event string is kept verbatim in [`Frame`] so that frames carrying
//! event types this client does not know yet still decode; [`EventType`] is
//! the closed set the client acts on.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChatError, ChatResult};

/// Event types understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A peer sent us a message.
    MessageReceived,
    /// The server accepted one of our messages.
    MessageCompleted,
    /// The transport closed. Emitted locally by the connection manager.
    ErrorClosed,
    /// Outbound: send a message to a peer.
    MessageSend,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::MessageReceived,
        EventType::MessageCompleted,
        EventType::ErrorClosed,
        EventType::MessageSend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message.received",
            Self::MessageCompleted => "message.completed",
            Self::ErrorClosed => "error.closed",
            Self::MessageSend => "message.send",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EventType {
    type Error = ChatError;

    fn try_from(v: &str) -> Result<Self, ChatError> {
        match v {
            "message.received" => Ok(Self::MessageReceived),
            "message.completed" => Ok(Self::MessageCompleted),
            "error.closed" => Ok(Self::ErrorClosed),
            "message.send" => Ok(Self::MessageSend),
            other => Err(ChatError::UnknownEventType(other.to_string())),
        }
    }
}

/// One unit on the chat socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event type string, e.g. `message.received`.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Build a frame from a known event type and a serializable payload.
    pub fn new<T: Serialize>(event: EventType, payload: &T) -> ChatResult<Self> {
        Ok(Self {
            event: event.as_str().to_string(),
            data: serde_json::to_value(payload)?,
        })
    }

    /// The synthetic frame the connection manager emits when a socket drops.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self {
            event: EventType::ErrorClosed.as_str().to_string(),
            data: serde_json::json!({ "reason": reason.into() }),
        }
    }

    /// Classify the event string.
    pub fn event_type(&self) -> ChatResult<EventType> {
        EventType::try_from(self.event.as_str())
    }

    /// Decode the payload into a typed struct.
    pub fn payload<T: DeserializeOwned>(&self) -> ChatResult<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| ChatError::Codec(format!("{} payload: {e}", self.event)))
    }

    /// The peer this frame concerns, used to keep per-peer handling in order.
    pub fn peer(&self) -> Option<&str> {
        self.data
            .get("sender")
            .or_else(|| self.data.get("recipient"))
            .and_then(Value::as_str)
    }
}

/// Payload of `message.received`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedPayload {
    pub sender: String,
    pub data: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Payload of `message.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    pub id: String,
    pub recipient: String,
}

/// Payload of `error.closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPayload {
    #[serde(default)]
    pub reason: String,
}

/// Payload of `message.send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendPayload {
    pub recipient: String,
    pub data: String,
    pub id: String,
}

/// A chat message as stored in a conversation log and as returned by the
/// history endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Display label: the peer's username, or ours for messages we sent.
    pub sender: String,
    /// Message text.
    #[serde(rename = "data")]
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Message {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names() {
        for ev in EventType::ALL {
            assert_eq!(EventType::try_from(ev.as_str()).unwrap(), ev);
        }
    }

    #[test]
    fn unknown_event_type_is_classified() {
        let frame = Frame {
            event: "presence.typing".into(),
            data: Value::Null,
        };
        match frame.event_type() {
            Err(ChatError::UnknownEventType(name)) => assert_eq!(name, "presence.typing"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn received_payload_without_timestamp() {
        let frame = Frame {
            event: "message.received".into(),
            data: serde_json::json!({ "sender": "alice", "data": "hi" }),
        };
        let p: ReceivedPayload = frame.payload().unwrap();
        assert_eq!(p.sender, "alice");
        assert_eq!(p.timestamp, None);
    }

    #[test]
    fn malformed_payload_is_codec_error() {
        let frame = Frame {
            event: "message.completed".into(),
            data: serde_json::json!({ "recipient": "bob" }),
        };
        assert!(matches!(
            frame.payload::<CompletedPayload>(),
            Err(ChatError::Codec(_))
        ));
    }

    #[test]
    fn peer_prefers_sender() {
        let received = Frame {
            event: "message.received".into(),
            data: serde_json::json!({ "sender": "alice", "data": "hi" }),
        };
        assert_eq!(received.peer(), Some("alice"));

        let completed = Frame {
            event: "message.completed".into(),
            data: serde_json::json!({ "id": "x", "recipient": "bob" }),
        };
        assert_eq!(completed.peer(), Some("bob"));

        assert_eq!(Frame::closed("eof").peer(), None);
    }

    #[test]
    fn history_message_uses_data_field() {
        let msg: Message =
            serde_json::from_str(r#"{"sender":"alice","data":"hello","timestamp":"t1"}"#).unwrap();
        assert_eq!(msg, Message::new("alice", "hello").with_timestamp("t1"));
    }
}
