//! Text-frame transports for the conversation socket.
//!
//! The session loop only needs a duplex of text frames, so the socket
//! implementation sits behind [`Connector`]. Production code uses
//! [`TungsteniteConnector`]. The `memory` module (unit tests, or the
//! `test-util` feature) scripts opens, refusals and drops without a network.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream};
use thiserror::Error;
use url::Url;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod tungstenite;

pub use self::tungstenite::TungsteniteConnector;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection closed")]
    Closed,
    #[error("transport error: {0}")]
    Io(String),
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open connection: outgoing frames go into `sink`, incoming frames come
/// out of `stream`. The stream ending means the peer went away.
pub struct Duplex {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Duplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplex").finish_non_exhaustive()
    }
}

/// Opens text-frame connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<Duplex, TransportError>;
}
