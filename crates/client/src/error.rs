//! Session-level errors.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no access token available")]
    MissingToken,
    #[error("not connected to conversation {0}")]
    NotConnected(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("server reported an error: {0}")]
    Server(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session has been stopped")]
    SessionClosed,
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}
