//! Casalink Client - realtime conversation client
//!
//! Connects a tenant or owner to a property conversation over WebSocket,
//! keeps the link alive with bounded reconnects, and exposes typed events
//! for messages, typing and presence. REST history and local conversation
//! state live alongside it.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod error;
pub mod stores;
pub mod transport;
pub mod ws;

pub use api_client::ApiClient;
pub use auth::{EnvToken, FileTokenStore, StaticToken, TokenStore};
pub use config::{ClientConfig, ReconnectConfig};
pub use error::ChatError;
pub use stores::ConversationStore;
pub use ws::{Callbacks, ChatSession, ConnectionState, SessionBuilder, SessionStatus};
