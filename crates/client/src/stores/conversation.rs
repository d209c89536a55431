//! Message, typing and presence state for one conversation.
//!
//! The store is a plain value with no I/O: feed it REST history and routed
//! realtime events, then read it back for display. Typing indicators are
//! timestamped by the caller so expiry is deterministic.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use casalink_shared::{ChatMessage, ServerFrame, UserId};

/// How long a typing signal stays visible without a refresh.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ConversationStore {
    /// Dated messages sorted by `created_at` ascending, then undated messages
    /// in arrival order.
    messages: Vec<ChatMessage>,
    /// Whether history has been fetched from the REST API.
    is_loaded: bool,
    typing: HashMap<UserId, Instant>,
    presence: HashMap<UserId, bool>,
    typing_ttl: Duration,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}

impl ConversationStore {
    pub fn new(typing_ttl: Duration) -> Self {
        Self {
            messages: Vec::new(),
            is_loaded: false,
            typing: HashMap::new(),
            presence: HashMap::new(),
            typing_ttl,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// Add a message, keeping order by `created_at`.
    /// Returns false if a message with the same ID already exists.
    pub fn add_message(&mut self, msg: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }

        if let Some(sender) = &msg.sender_id {
            self.typing.remove(sender);
        }

        let pos = match msg.created_at {
            Some(ts) => self
                .messages
                .iter()
                .rposition(|m| m.created_at.is_some_and(|other| other <= ts))
                .map_or(0, |i| i + 1),
            None => self.messages.len(),
        };
        self.messages.insert(pos, msg);
        true
    }

    /// Replace the message list with fetched history, keeping any realtime
    /// messages the history does not contain yet.
    pub fn set_history(&mut self, history: Vec<ChatMessage>) {
        let live = std::mem::take(&mut self.messages);
        let mut sorted = history;
        sorted.sort_by_key(|m| (m.created_at.is_none(), m.created_at));
        let mut deduped: Vec<ChatMessage> = Vec::with_capacity(sorted.len());
        for msg in sorted {
            if !deduped.iter().any(|m| m.id == msg.id) {
                deduped.push(msg);
            }
        }
        self.messages = deduped;
        for msg in live {
            self.add_message(msg);
        }
        self.is_loaded = true;
    }

    pub fn mark_typing(&mut self, user_id: impl Into<UserId>, now: Instant) {
        self.typing.insert(user_id.into(), now);
    }

    /// Users whose typing signal is younger than the TTL, sorted.
    pub fn typing_users(&self, now: Instant) -> Vec<&str> {
        let mut users: Vec<&str> = self
            .typing
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) < self.typing_ttl)
            .map(|(user, _)| user.as_str())
            .collect();
        users.sort_unstable();
        users
    }

    /// Forget expired typing signals.
    pub fn prune_typing(&mut self, now: Instant) {
        let ttl = self.typing_ttl;
        self.typing
            .retain(|_, at| now.saturating_duration_since(*at) < ttl);
    }

    pub fn set_presence(&mut self, user_id: impl Into<UserId>, is_online: bool) {
        let user_id = user_id.into();
        if !is_online {
            self.typing.remove(&user_id);
        }
        self.presence.insert(user_id, is_online);
    }

    /// Participants default to offline until a presence signal says otherwise.
    pub fn is_online(&self, user_id: &str) -> bool {
        self.presence.get(user_id).copied().unwrap_or(false)
    }

    /// Apply a decoded frame. Returns true if the store changed.
    pub fn apply(&mut self, frame: ServerFrame, now: Instant) -> bool {
        match frame {
            ServerFrame::Message { message } => self.add_message(message),
            ServerFrame::Typing { user_id } => {
                self.mark_typing(user_id, now);
                true
            }
            ServerFrame::Presence { user_id, is_online } => {
                self.set_presence(user_id, is_online);
                true
            }
            ServerFrame::Error { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, minute: Option<u32>) -> ChatMessage {
        let mut m = ChatMessage::new(id, format!("body {id}"));
        m.created_at = minute.map(|min| Utc.with_ymd_and_hms(2024, 5, 1, 10, min, 0).unwrap());
        m
    }

    fn ids(store: &ConversationStore) -> Vec<&str> {
        store.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn messages_are_ordered_and_deduplicated() {
        let mut store = ConversationStore::default();
        assert!(store.add_message(msg("b", Some(5))));
        assert!(store.add_message(msg("a", Some(1))));
        assert!(store.add_message(msg("c", Some(5))));
        assert!(store.add_message(msg("x", None)));
        assert!(!store.add_message(msg("a", Some(9))));
        assert_eq!(ids(&store), vec!["a", "b", "c", "x"]);
    }

    #[test]
    fn history_merges_with_live_messages() {
        let mut store = ConversationStore::default();
        store.add_message(msg("live", Some(30)));
        store.add_message(msg("h2", Some(20)));

        store.set_history(vec![msg("h2", Some(20)), msg("h1", Some(10)), msg("h1", Some(10))]);
        assert!(store.is_loaded());
        assert_eq!(ids(&store), vec!["h1", "h2", "live"]);
    }

    #[test]
    fn undated_messages_stay_after_dated_ones() {
        let mut store = ConversationStore::default();
        store.set_history(vec![msg("undated", None), msg("h2", Some(20)), msg("h1", Some(10))]);
        assert_eq!(ids(&store), vec!["h1", "h2", "undated"]);

        assert!(store.add_message(msg("early", Some(5))));
        assert!(store.add_message(msg("mid", Some(15))));
        assert!(store.add_message(msg("late", None)));
        assert!(store.add_message(msg("newest", Some(30))));
        assert_eq!(
            ids(&store),
            vec!["early", "h1", "mid", "h2", "newest", "undated", "late"]
        );
    }

    #[test]
    fn typing_expires_and_clears_on_message() {
        let t0 = Instant::now();
        let mut store = ConversationStore::new(Duration::from_secs(3));
        store.mark_typing("u1", t0);
        store.mark_typing("u2", t0 + Duration::from_secs(2));
        assert_eq!(store.typing_users(t0 + Duration::from_secs(1)), vec!["u1", "u2"]);
        assert_eq!(store.typing_users(t0 + Duration::from_secs(4)), vec!["u2"]);

        let mut from_u2 = msg("m1", None);
        from_u2.sender_id = Some("u2".into());
        store.add_message(from_u2);
        assert!(store.typing_users(t0 + Duration::from_secs(2)).iter().all(|u| *u != "u2"));

        store.prune_typing(t0 + Duration::from_secs(10));
        assert!(store.typing_users(t0).is_empty());
    }

    #[test]
    fn presence_defaults_to_offline() {
        let mut store = ConversationStore::default();
        assert!(!store.is_online("owner"));
        store.set_presence("owner", true);
        assert!(store.is_online("owner"));

        let now = Instant::now();
        store.mark_typing("owner", now);
        store.set_presence("owner", false);
        assert!(!store.is_online("owner"));
        assert!(store.typing_users(now).is_empty());
    }

    #[test]
    fn applies_decoded_frames() {
        let now = Instant::now();
        let mut store = ConversationStore::default();
        let frames = [
            r#"{"type":"message","message":{"id":"m1","content":"hi"}}"#,
            r#"{"type":"message","message":{"id":"m1","content":"hi"}}"#,
            r#"{"type":"typing","user_id":4}"#,
            r#"{"type":"presence","user_id":4,"is_online":true}"#,
            r#"{"type":"error","error":"boom"}"#,
        ];
        let changed: Vec<bool> = frames
            .iter()
            .map(|f| store.apply(ServerFrame::decode(f).unwrap(), now))
            .collect();
        assert_eq!(changed, vec![true, false, true, true, false]);
        assert_eq!(ids(&store), vec!["m1"]);
        assert_eq!(store.typing_users(now), vec!["4"]);
        assert!(store.is_online("4"));
    }
}
