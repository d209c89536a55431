//! Connection lifecycle state.

/// Connection state for a conversation socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Nothing open and nothing scheduled.
    #[default]
    Idle,
    /// An open is in flight.
    Connecting,
    Connected,
    /// The last connection dropped or failed to open. A reconnect may be
    /// scheduled; once retries are exhausted this state is quiescent.
    Disconnected,
}

/// Lifecycle events that move a connection between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start opening a connection, superseding whatever was there.
    Dial,
    /// The open completed.
    Opened,
    /// The open failed or the live connection closed.
    Dropped,
    /// Torn down on request.
    Released,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Apply `transition`, or `None` if it is not legal from this state.
    pub fn next(self, transition: Transition) -> Option<ConnectionState> {
        use ConnectionState::*;
        use Transition::*;

        match (self, transition) {
            (_, Released) => Some(Idle),
            (_, Dial) => Some(Connecting),
            (Connecting, Opened) => Some(Connected),
            (Connecting | Connected, Dropped) => Some(Disconnected),
            _ => None,
        }
    }
}

/// Snapshot published to observers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Automatic reconnects made since the last successful open.
    pub retries: u32,
}
