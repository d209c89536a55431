//! Shared error types.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame has no `type` discriminant")]
    MissingType,
    #[error("unknown frame type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` frame: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, FrameError::UnknownType(_))
    }
}

/// Error body returned by the REST backend.
///
/// `detail` is either a string or a list of validation entries carrying a
/// `msg` field.
#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Attempt to extract a user-facing message from an error response body.
/// Prefers `detail`, falls back to `message`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;

    let detail = match parsed.detail {
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(entries)) => {
            let msgs: Vec<&str> = entries
                .iter()
                .filter_map(|e| e.get("msg").and_then(Value::as_str))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join("; "))
        }
        _ => None,
    };

    detail
        .filter(|d| !d.trim().is_empty())
        .or_else(|| parsed.message.filter(|m| !m.trim().is_empty()))
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    InvalidUrl(String),
    Network(String),
    Http { status: u16, body: String },
    Deserialize(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            ApiError::Network(msg) => write!(f, "Network error: {}", msg),
            ApiError::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            ApiError::Deserialize(msg) => write!(f, "Deserialization error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}
