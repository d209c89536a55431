//! Realtime conversation sockets.
//!
//! This module provides:
//! - Connection management with bounded auto-reconnect
//! - Typed dispatch of inbound frames
//! - Encoding of outbound commands
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   commands (mpsc)   ┌──────────────────────────┐
//! │     ChatSession      │ ──────────────────▶ │       session task       │
//! │ send_message/typing  │                     │ state machine + backoff  │
//! │ connect/reconnect    │ ◀────────────────── │ owns the only connection │
//! └──────────────────────┘   status (watch)    └──────────────────────────┘
//!                                                   │              ▲
//!                                         frames    ▼              │  frames
//!                                              ┌──────────┐   ┌──────────┐
//!                                              │ Callbacks│   │ Connector│
//!                                              │ (router) │   │ (socket) │
//!                                              └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let callbacks = Callbacks::new()
//!     .on_message(|msg| println!("{}: {}", msg.id, msg.content))
//!     .on_presence(|user, online| println!("{user} online={online}"));
//!
//! let session = SessionBuilder::new("abc123", config.ws_base.clone(), EnvToken::default())
//!     .reconnect(config.reconnect.clone())
//!     .callbacks(callbacks)
//!     .start();
//!
//! session.send_text("Is the apartment still available?")?;
//! session.stop().await;
//! ```

mod connection;
mod router;
mod session;

pub use connection::{ConnectionState, SessionStatus, Transition};
pub use router::Callbacks;
pub use session::{endpoint_url, ChatSession, SessionBuilder};
