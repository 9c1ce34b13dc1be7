//! JSON text framing for the chat socket.
//!
//! Wire format: one WebSocket text message per frame, holding
//! `{"event": <string>, "data": <object>}`.

use crate::error::{ChatError, ChatResult};
use crate::messages::Frame;

/// Encode a frame into its text form.
pub fn encode_frame(frame: &Frame) -> ChatResult<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a text message into a frame.
///
/// Only the envelope is validated here; payloads are decoded by the handler
/// that owns the event type.
pub fn decode_frame(text: &str) -> ChatResult<Frame> {
    let frame: Frame = serde_json::from_str(text)?;
    if frame.event.is_empty() {
        return Err(ChatError::Codec("frame has an empty event type".into()));
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{EventType, SendPayload};

    #[test]
    fn send_frame_shape() {
        let frame = Frame::new(
            EventType::MessageSend,
            &SendPayload {
                recipient: "bob".into(),
                data: "hey".into(),
                id: "abc".into(),
            },
        )
        .unwrap();
        let text = encode_frame(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "message.send");
        assert_eq!(value["data"]["recipient"], "bob");
        assert_eq!(value["data"]["data"], "hey");
        assert_eq!(value["data"]["id"], "abc");
    }

    #[test]
    fn decode_missing_data_defaults_to_null() {
        let frame = decode_frame(r#"{"event":"server.ping"}"#).unwrap();
        assert_eq!(frame.event, "server.ping");
        assert!(frame.data.is_null());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_frame("not json"), Err(ChatError::Codec(_))));
        assert!(matches!(
            decode_frame(r#"{"event":"","data":{}}"#),
            Err(ChatError::Codec(_))
        ));
    }
}
