//! One conversation socket with bounded auto-reconnect.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use casalink_shared::{ClientFrame, MessageKind};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

use super::connection::{ConnectionState, SessionStatus, Transition};
use super::router::Callbacks;
use crate::auth::{usable, TokenStore};
use crate::config::ReconnectConfig;
use crate::error::ChatError;
use crate::transport::{Connector, Duplex, TransportError, TungsteniteConnector};

/// How long a graceful close may take before the socket is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Realtime endpoint for a conversation:
/// `<ws-base>/chat/ws/chat/<conversation_id>?token=<token>`.
pub fn endpoint_url(ws_base: &Url, conversation_id: &str, token: &str) -> Result<Url, ChatError> {
    let mut url = ws_base.clone();
    url.path_segments_mut()
        .map_err(|()| ChatError::InvalidUrl(ws_base.to_string()))?
        .pop_if_empty()
        .extend(["chat", "ws", "chat", conversation_id]);
    url.set_query(None);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

#[derive(Debug)]
enum Command {
    /// Tear down whatever exists and open a fresh connection.
    Connect { reset_retries: bool },
    /// An encoded frame for the live connection. Best-effort frames are
    /// dropped quietly if the link is gone by the time they are written.
    Send { frame: String, best_effort: bool },
    Stop,
}

/// Configures and starts a [`ChatSession`].
pub struct SessionBuilder {
    conversation_id: String,
    ws_base: Url,
    tokens: Arc<dyn TokenStore>,
    connector: Arc<dyn Connector>,
    reconnect: ReconnectConfig,
    callbacks: Callbacks,
}

impl SessionBuilder {
    pub fn new(conversation_id: impl Into<String>, ws_base: Url, tokens: impl TokenStore) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            ws_base,
            tokens: Arc::new(tokens),
            connector: Arc::new(TungsteniteConnector),
            reconnect: ReconnectConfig::default(),
            callbacks: Callbacks::default(),
        }
    }

    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Spawn the session task and begin connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> ChatSession {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus::default());

        let span = tracing::info_span!("chat_session", conversation_id = %self.conversation_id);
        let session_loop = SessionLoop {
            conversation_id: self.conversation_id.clone(),
            ws_base: self.ws_base,
            tokens: self.tokens,
            connector: self.connector,
            reconnect: self.reconnect,
            callbacks: self.callbacks,
            status: status_tx,
            state: ConnectionState::Idle,
            retries: 0,
            opening: None,
            link: None,
            backoff: None,
        };

        // Queued before the task runs, so the first thing it does is connect.
        let _ = commands.send(Command::Connect { reset_retries: true });
        let task = tokio::spawn(session_loop.run(command_rx).instrument(span));

        ChatSession {
            conversation_id: self.conversation_id,
            commands,
            status,
            task: Some(task),
        }
    }
}

/// Handle to a running conversation session.
///
/// Dropping the handle aborts the session task, which releases the socket
/// and any pending reconnect timer. [`ChatSession::stop`] does the same but
/// closes the socket gracefully and waits for the task to finish.
pub struct ChatSession {
    conversation_id: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: Option<JoinHandle<()>>,
}

impl ChatSession {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Automatic reconnects made since the last successful open.
    pub fn retries(&self) -> u32 {
        self.status().retries
    }

    /// Receiver that is notified on every state or retry-count change.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Open a new connection, superseding the current one. The retry
    /// counter is left as is.
    pub fn connect(&self) -> Result<(), ChatError> {
        self.command(Command::Connect {
            reset_retries: false,
        })
    }

    /// Drop the current connection, reset the retry counter and connect
    /// again immediately, skipping any pending backoff.
    pub fn reconnect(&self) -> Result<(), ChatError> {
        self.command(Command::Connect {
            reset_retries: true,
        })
    }

    /// Send a chat message. Fails with [`ChatError::NotConnected`] when the
    /// session is not connected; nothing is queued.
    pub fn send_message(&self, content: impl Into<String>, kind: MessageKind) -> Result<(), ChatError> {
        if !self.is_connected() {
            warn!(conversation_id = %self.conversation_id, "cannot send message while disconnected");
            return Err(ChatError::NotConnected(self.conversation_id.clone()));
        }
        let frame = ClientFrame::message(content, kind).encode()?;
        self.command(Command::Send {
            frame,
            best_effort: false,
        })
    }

    pub fn send_text(&self, content: impl Into<String>) -> Result<(), ChatError> {
        self.send_message(content, MessageKind::Text)
    }

    /// Best-effort typing indicator; does nothing while disconnected.
    pub fn send_typing(&self) {
        if !self.is_connected() {
            debug!(conversation_id = %self.conversation_id, "not connected, skipping typing signal");
            return;
        }
        match ClientFrame::Typing.encode() {
            Ok(frame) => {
                let _ = self.command(Command::Send {
                    frame,
                    best_effort: true,
                });
            }
            Err(e) => debug!(error = %e, "failed to encode typing signal"),
        }
    }

    /// Close the connection, cancel any scheduled reconnect and wait for the
    /// session task to finish. No callbacks fire once this returns.
    pub async fn stop(mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(conversation_id = %self.conversation_id, "session task panicked");
                }
            }
        }
    }

    fn command(&self, command: Command) -> Result<(), ChatError> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::SessionClosed)
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation_id", &self.conversation_id)
            .field("status", &self.status())
            .finish()
    }
}

/// State owned by the session task. Every lifecycle event is handled here,
/// one at a time, so nothing in it needs a lock.
struct SessionLoop {
    conversation_id: String,
    ws_base: Url,
    tokens: Arc<dyn TokenStore>,
    connector: Arc<dyn Connector>,
    reconnect: ReconnectConfig,
    callbacks: Callbacks,
    status: watch::Sender<SessionStatus>,
    state: ConnectionState,
    retries: u32,
    /// In-flight open. Replacing or clearing it abandons that attempt.
    opening: Option<BoxFuture<'static, Result<Duplex, TransportError>>>,
    link: Option<Duplex>,
    backoff: Option<Pin<Box<Sleep>>>,
}

impl SessionLoop {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command {
                        Some(Command::Connect { reset_retries }) => {
                            self.teardown().await;
                            if reset_retries {
                                self.retries = 0;
                            }
                            self.dial();
                        }
                        Some(Command::Send { frame, best_effort }) => {
                            self.transmit(frame, best_effort).await
                        }
                        Some(Command::Stop) | None => break,
                    }
                }

                opened = next_open(&mut self.opening) => {
                    self.opening = None;
                    match opened {
                        Ok(duplex) => self.on_open(duplex),
                        Err(e) => self.on_drop(Some(e)),
                    }
                }

                frame = next_frame(&mut self.link) => {
                    match frame {
                        Some(Ok(text)) => self.on_frame(&text),
                        Some(Err(e)) => {
                            self.link = None;
                            self.on_drop(Some(e));
                        }
                        None => {
                            self.link = None;
                            self.on_drop(None);
                        }
                    }
                }

                () = backoff_elapsed(&mut self.backoff) => {
                    self.backoff = None;
                    self.retries += 1;
                    self.dial();
                }
            }

            self.publish();
        }

        self.teardown().await;
        self.publish();
        info!("session stopped");
    }

    fn dial(&mut self) {
        let Some(token) = usable(self.tokens.access_token()) else {
            warn!("no access token available, not connecting");
            self.callbacks.report(&ChatError::MissingToken);
            return;
        };

        let url = match endpoint_url(&self.ws_base, &self.conversation_id, &token) {
            Ok(url) => url,
            Err(e) => {
                error!(error = %e, "cannot build conversation endpoint");
                self.callbacks.report(&e);
                return;
            }
        };

        self.apply(Transition::Dial);
        info!(attempt = self.retries, "connecting");

        let connector = Arc::clone(&self.connector);
        self.opening = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    fn on_open(&mut self, duplex: Duplex) {
        self.link = Some(duplex);
        self.retries = 0;
        self.apply(Transition::Opened);
        info!("connected");
    }

    /// Failed opens and lost connections are handled alike.
    fn on_drop(&mut self, cause: Option<TransportError>) {
        match cause {
            Some(e) => {
                error!(error = %e, "connection lost");
                self.callbacks.report(&ChatError::Transport(e));
            }
            None => info!("connection closed by server"),
        }

        self.apply(Transition::Dropped);

        if self.retries < self.reconnect.max_attempts {
            let delay = self.reconnect.delay_for_attempt(self.retries);
            info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.retries + 1,
                "scheduling reconnect"
            );
            self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
        } else {
            warn!(
                max_attempts = self.reconnect.max_attempts,
                "reconnect attempts exhausted, staying disconnected"
            );
        }
    }

    fn on_frame(&self, text: &str) {
        match self.callbacks.route(text) {
            Ok(kind) => debug!(kind, "dispatched frame"),
            Err(e) if e.is_unknown_type() => warn!(error = %e, "dropping frame"),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    async fn transmit(&mut self, frame: String, best_effort: bool) {
        let Some(link) = self.link.as_mut() else {
            if best_effort {
                debug!("not connected, dropping typing signal");
            } else {
                warn!("not connected, dropping outbound frame");
                self.callbacks
                    .report(&ChatError::NotConnected(self.conversation_id.clone()));
            }
            return;
        };

        debug!(frame = %frame, "sending frame");
        if let Err(e) = link.sink.send(frame).await {
            error!(error = %e, "send failed");
            self.callbacks.report(&ChatError::Transport(e));
        }
    }

    /// Release the connection, any in-flight open and any pending reconnect.
    async fn teardown(&mut self) {
        self.backoff = None;
        if self.opening.take().is_some() {
            debug!("abandoning in-flight connect");
        }
        if let Some(mut link) = self.link.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, link.sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "error while closing connection"),
                Err(_) => debug!("timed out closing connection"),
            }
        }
        if self.state != ConnectionState::Idle {
            self.apply(Transition::Released);
        }
    }

    fn apply(&mut self, transition: Transition) {
        match self.state.next(transition) {
            Some(next) => self.state = next,
            None => warn!(state = ?self.state, ?transition, "ignoring illegal transition"),
        }
    }

    fn publish(&self) {
        let current = SessionStatus {
            state: self.state,
            retries: self.retries,
        };
        self.status.send_if_modified(|status| {
            if *status == current {
                false
            } else {
                *status = current;
                true
            }
        });
    }
}

async fn next_open(
    opening: &mut Option<BoxFuture<'static, Result<Duplex, TransportError>>>,
) -> Result<Duplex, TransportError> {
    match opening {
        Some(open) => open.await,
        None => pending().await,
    }
}

async fn next_frame(link: &mut Option<Duplex>) -> Option<Result<String, TransportError>> {
    match link {
        Some(link) => link.stream.next().await,
        None => pending().await,
    }
}

async fn backoff_elapsed(backoff: &mut Option<Pin<Box<Sleep>>>) {
    match backoff {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
