//! Client-side state for conversations.

pub mod conversation;

pub use conversation::{ConversationStore, DEFAULT_TYPING_TTL};
