//! In-memory transport with scripted connection outcomes.
//!
//! Every call to [`Connector::connect`] consumes the next scripted outcome
//! (accepting when the script is empty, unless [`MemoryConnector::refuse_all`]
//! was called). Accepted connections hand a [`MemoryPeer`] to the test, which
//! plays the server side.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_channel::{mpsc, oneshot};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::time::Instant;
use url::Url;

use super::{Connector, Duplex, TransportError};

enum Outcome {
    Accept,
    Refuse,
    Defer(oneshot::Receiver<bool>),
}

/// A recorded connection attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub url: Url,
    pub at: Instant,
}

#[derive(Default)]
struct Shared {
    script: VecDeque<Outcome>,
    refuse_by_default: bool,
    attempts: Vec<Attempt>,
    peers: VecDeque<MemoryPeer>,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn accept_next(&self) {
        self.lock().script.push_back(Outcome::Accept);
    }

    pub fn refuse_next(&self) {
        self.lock().script.push_back(Outcome::Refuse);
    }

    /// Refuse every attempt that has no scripted outcome.
    pub fn refuse_all(&self) {
        self.lock().refuse_by_default = true;
    }

    /// Accept every attempt that has no scripted outcome.
    pub fn accept_all(&self) {
        self.lock().refuse_by_default = false;
    }

    /// Hold the next attempt open until the returned sender resolves it:
    /// `true` accepts, `false` (or dropping the sender) refuses.
    pub fn defer_next(&self) -> oneshot::Sender<bool> {
        let (tx, rx) = oneshot::channel();
        self.lock().script.push_back(Outcome::Defer(rx));
        tx
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Take the server side of the oldest accepted connection not yet taken.
    pub fn take_peer(&self) -> Option<MemoryPeer> {
        self.lock().peers.pop_front()
    }

    fn open(&self) -> Duplex {
        let (out_tx, out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<String>();

        self.lock().peers.push_back(MemoryPeer {
            sent: out_rx,
            inbound: Some(in_tx),
        });

        Duplex {
            sink: Box::pin(out_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(in_rx.map(Ok)),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Duplex, TransportError> {
        let outcome = {
            let mut shared = self.lock();
            shared.attempts.push(Attempt {
                url: url.clone(),
                at: Instant::now(),
            });
            match shared.script.pop_front() {
                Some(outcome) => outcome,
                None if shared.refuse_by_default => Outcome::Refuse,
                None => Outcome::Accept,
            }
        };

        let accept = match outcome {
            Outcome::Accept => true,
            Outcome::Refuse => false,
            Outcome::Defer(rx) => rx.await.unwrap_or(false),
        };

        if accept {
            Ok(self.open())
        } else {
            Err(TransportError::Connect("refused by memory connector".into()))
        }
    }
}

/// Server side of an accepted in-memory connection.
pub struct MemoryPeer {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryPeer {
    /// Deliver a frame to the client. Returns `false` once the client side
    /// is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        match &self.inbound {
            Some(tx) => tx.unbounded_send(frame.into()).is_ok(),
            None => false,
        }
    }

    /// Drop the connection from the server side.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Whether the client has released its end of the connection.
    pub fn is_closed(&self) -> bool {
        self.inbound.as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Next frame the client sent, waiting for it if necessary.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.next().await
    }

    /// Frames the client has sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(Some(frame)) = self.sent.next().now_or_never() {
            frames.push(frame);
        }
        frames
    }
}
