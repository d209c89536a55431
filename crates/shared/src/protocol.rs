//! Realtime conversation protocol.
//!
//! Every frame on the conversation socket is a JSON object whose `type`
//! field selects the variant:
//!
//! ```text
//! server -> client   {"type":"message","message":{...}}
//!                    {"type":"typing","user_id":...}
//!                    {"type":"presence","user_id":...,"is_online":true}
//!                    {"type":"error","error":"..."}
//! client -> server   {"type":"message","content":"...","message_type":"text"}
//!                    {"type":"typing"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;
use crate::models::{lenient, ChatMessage, MessageKind, UserId};

/// Frames pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Message {
        message: ChatMessage,
    },
    Typing {
        #[serde(deserialize_with = "lenient::string_or_number")]
        user_id: UserId,
    },
    Presence {
        #[serde(deserialize_with = "lenient::string_or_number")]
        user_id: UserId,
        is_online: bool,
    },
    Error {
        #[serde(default, deserialize_with = "lenient::description")]
        error: String,
    },
}

impl ServerFrame {
    /// Discriminants this client understands.
    pub const KNOWN_TYPES: [&'static str; 4] = ["message", "typing", "presence", "error"];

    /// Decode a text frame.
    ///
    /// Frames that are not JSON objects, lack a `type`, carry an unknown
    /// `type`, or have a payload that does not match their `type` are all
    /// rejected with a distinct [`FrameError`].
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_owned();

        if !Self::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(FrameError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| FrameError::InvalidPayload { kind, source })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Message { .. } => "message",
            ServerFrame::Typing { .. } => "typing",
            ServerFrame::Presence { .. } => "presence",
            ServerFrame::Error { .. } => "error",
        }
    }
}

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Message {
        content: String,
        message_type: MessageKind,
    },
    Typing,
}

impl ClientFrame {
    pub fn message(content: impl Into<String>, kind: MessageKind) -> Self {
        ClientFrame::Message {
            content: content.into(),
            message_type: kind,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn encodes_outbound_frames() {
        let frame = ClientFrame::message("hello", MessageKind::Text).encode().unwrap();
        assert_eq!(
            as_json(&frame),
            json!({"type": "message", "content": "hello", "message_type": "text"})
        );

        let frame = ClientFrame::message("deed.pdf", MessageKind::Document).encode().unwrap();
        assert_eq!(as_json(&frame)["message_type"], "document");

        assert_eq!(as_json(&ClientFrame::Typing.encode().unwrap()), json!({"type": "typing"}));
    }

    #[test]
    fn decodes_each_inbound_variant() {
        let frame = ServerFrame::decode(r#"{"type":"message","message":{"id":"m1","content":"hi"}}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Message {
                message: ChatMessage::new("m1", "hi")
            }
        );

        let frame = ServerFrame::decode(r#"{"type":"typing","user_id":12}"#).unwrap();
        assert_eq!(frame, ServerFrame::Typing { user_id: "12".into() });

        let frame = ServerFrame::decode(r#"{"type":"presence","user_id":"u9","is_online":false}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Presence {
                user_id: "u9".into(),
                is_online: false
            }
        );

        let frame = ServerFrame::decode(r#"{"type":"error","error":{"code":403}}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Error {
                error: r#"{"code":403}"#.into()
            }
        );
        assert_eq!(frame.kind(), "error");
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        assert!(matches!(ServerFrame::decode("not json"), Err(FrameError::Malformed(_))));
        assert!(matches!(ServerFrame::decode("[1,2]"), Err(FrameError::MissingType)));
        assert!(matches!(ServerFrame::decode(r#"{"message":{}}"#), Err(FrameError::MissingType)));
        assert!(matches!(ServerFrame::decode(r#"{"type":7}"#), Err(FrameError::MissingType)));
    }

    #[test]
    fn unknown_types_are_distinguished() {
        let err = ServerFrame::decode(r#"{"type":"read_receipt","message_id":"m1"}"#).unwrap_err();
        assert!(err.is_unknown_type());
        assert_eq!(err.to_string(), "unknown frame type `read_receipt`");
    }

    #[test]
    fn known_type_with_bad_payload_is_invalid() {
        let err = ServerFrame::decode(r#"{"type":"presence","user_id":"u1"}"#).unwrap_err();
        assert!(matches!(err, FrameError::InvalidPayload { ref kind, .. } if kind == "presence"));
    }
}
