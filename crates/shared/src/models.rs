//! Shared data models for conversation messages and participants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity ---

/// Identifier of a conversation participant.
///
/// The backend emits user ids either as JSON strings or as integers; both are
/// normalized to their textual form.
pub type UserId = String;

// --- Messages ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Document,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Document => "document",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "document" => Ok(MessageKind::Document),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// A chat message as delivered by the REST history endpoint and by
/// `message` frames on the realtime connection.
///
/// Only `id` is mandatory; a missing `content` decodes as empty. Fields this
/// client does not model are kept in `extra` so callers always see the
/// complete payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChatMessage {
    #[serde(deserialize_with = "lenient::string_or_number")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string_or_number"
    )]
    pub sender_id: Option<UserId>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string_or_number"
    )]
    pub conversation_id: Option<String>,
    /// Unknown kinds decode as `None` rather than rejecting the message.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_message_kind"
    )]
    pub message_type: Option<MessageKind>,
    /// Timestamps without an offset are taken as UTC.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_timestamp"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Kind of the message, defaulting to text when the backend omits it.
    pub fn kind(&self) -> MessageKind {
        self.message_type.unwrap_or_default()
    }
}

/// Deserializers that accept the loose shapes the backend produces.
pub(crate) mod lenient {
    use super::*;
    use serde::de::{self, Deserializer};
    use serde_json::Value;

    fn value_to_id<E: de::Error>(value: Value) -> Result<String, E> {
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(E::custom(format!(
                "expected a string or number identifier, got {other}"
            ))),
        }
    }

    pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        value_to_id(Value::deserialize(deserializer)?)
    }

    pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            value => value_to_id(value).map(Some),
        }
    }

    pub fn opt_message_kind<'de, D>(deserializer: D) -> Result<Option<MessageKind>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    pub fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }

    /// Error descriptions arrive as plain strings or as structured objects.
    pub fn description<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_payload_decodes() {
        let msg: ChatMessage = serde_json::from_value(json!({"id": "m1", "content": "hi"})).unwrap();
        assert_eq!(msg, ChatMessage::new("m1", "hi"));
        assert_eq!(msg.kind(), MessageKind::Text);
    }

    #[test]
    fn only_id_is_required() {
        let msg: ChatMessage = serde_json::from_value(json!({"id": "m3"})).unwrap();
        assert_eq!(msg.content, "");
        assert!(serde_json::from_value::<ChatMessage>(json!({"content": "hi"})).is_err());
    }

    #[test]
    fn numeric_ids_are_normalized() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": 42,
            "content": "hola",
            "sender_id": 7,
            "conversation_id": "abc123"
        }))
        .unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.sender_id.as_deref(), Some("7"));
        assert_eq!(msg.conversation_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": "m1",
            "created_at": "2024-05-01T10:30:00.123456"
        }))
        .unwrap();
        let ts = msg.created_at.unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T10:30:00.123456+00:00");
    }

    #[test]
    fn unknown_fields_and_kinds_are_kept_loose() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": "m2",
            "content": "https://cdn.example/plan.png",
            "message_type": "sticker",
            "property_id": 991
        }))
        .unwrap();
        assert_eq!(msg.message_type, None);
        assert_eq!(msg.extra.get("property_id"), Some(&json!(991)));

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["property_id"], json!(991));
    }

    #[test]
    fn message_kind_parses_case_insensitively() {
        assert_eq!("Image".parse::<MessageKind>(), Ok(MessageKind::Image));
        assert_eq!(MessageKind::Document.to_string(), "document");
        assert!("video".parse::<MessageKind>().is_err());
    }
}
