//! Inbound frame dispatch.

use std::fmt;
use std::sync::Arc;

use casalink_shared::{ChatMessage, FrameError, ServerFrame, UserId};

use crate::error::ChatError;

type MessageFn = Arc<dyn Fn(ChatMessage) + Send + Sync>;
type TypingFn = Arc<dyn Fn(UserId) + Send + Sync>;
type PresenceFn = Arc<dyn Fn(UserId, bool) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&ChatError) + Send + Sync>;

/// Typed callbacks invoked by a session.
///
/// Callbacks run on the session task, one at a time and in the order frames
/// arrived. They should return quickly; hand heavy work to another task.
#[derive(Clone, Default)]
pub struct Callbacks {
    on_message: Option<MessageFn>,
    on_typing: Option<TypingFn>,
    on_presence: Option<PresenceFn>,
    on_error: Option<ErrorFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(mut self, f: impl Fn(ChatMessage) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_typing(mut self, f: impl Fn(UserId) + Send + Sync + 'static) -> Self {
        self.on_typing = Some(Arc::new(f));
        self
    }

    /// Called with the participant id and whether they are online.
    pub fn on_presence(mut self, f: impl Fn(UserId, bool) + Send + Sync + 'static) -> Self {
        self.on_presence = Some(Arc::new(f));
        self
    }

    /// Called for connection failures and for `error` frames from the server.
    pub fn on_error(mut self, f: impl Fn(&ChatError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn report(&self, err: &ChatError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }

    /// Decode `text` and hand it to exactly one callback.
    ///
    /// Returns the frame kind that was dispatched. Rejected frames invoke no
    /// callback; the caller decides how to log them.
    pub fn route(&self, text: &str) -> Result<&'static str, FrameError> {
        let frame = ServerFrame::decode(text)?;
        let kind = frame.kind();

        match frame {
            ServerFrame::Message { message } => {
                if let Some(f) = &self.on_message {
                    f(message);
                }
            }
            ServerFrame::Typing { user_id } => {
                if let Some(f) = &self.on_typing {
                    f(user_id);
                }
            }
            ServerFrame::Presence { user_id, is_online } => {
                if let Some(f) = &self.on_presence {
                    f(user_id, is_online);
                }
            }
            ServerFrame::Error { error } => {
                tracing::warn!(error = %error, "server reported an error");
                self.report(&ChatError::Server(error));
            }
        }

        Ok(kind)
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_message", &self.on_message.is_some())
            .field("on_typing", &self.on_typing.is_some())
            .field("on_presence", &self.on_presence.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        messages: Vec<ChatMessage>,
        typing: Vec<UserId>,
        presence: Vec<(UserId, bool)>,
        errors: Vec<String>,
    }

    fn recording() -> (Callbacks, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let (m, t, p, e) = (seen.clone(), seen.clone(), seen.clone(), seen.clone());
        let callbacks = Callbacks::new()
            .on_message(move |msg| m.lock().unwrap().messages.push(msg))
            .on_typing(move |user| t.lock().unwrap().typing.push(user))
            .on_presence(move |user, online| p.lock().unwrap().presence.push((user, online)))
            .on_error(move |err| e.lock().unwrap().errors.push(err.to_string()));
        (callbacks, seen)
    }

    fn total(seen: &Seen) -> usize {
        seen.messages.len() + seen.typing.len() + seen.presence.len() + seen.errors.len()
    }

    #[test]
    fn message_frame_reaches_on_message_once() {
        let (callbacks, seen) = recording();
        let kind = callbacks
            .route(r#"{"type":"message","message":{"id":"m1","content":"hi"}}"#)
            .unwrap();
        assert_eq!(kind, "message");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.messages, vec![ChatMessage::new("m1", "hi")]);
        assert_eq!(total(&seen), 1);
    }

    #[test]
    fn typing_and_presence_frames() {
        let (callbacks, seen) = recording();
        callbacks.route(r#"{"type":"typing","user_id":"u2"}"#).unwrap();
        callbacks
            .route(r#"{"type":"presence","user_id":3,"is_online":true}"#)
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.typing, vec!["u2".to_string()]);
        assert_eq!(seen.presence, vec![("3".to_string(), true)]);
    }

    #[test]
    fn error_frame_goes_to_on_error() {
        let (callbacks, seen) = recording();
        callbacks.route(r#"{"type":"error","error":"rate limited"}"#).unwrap();
        assert_eq!(
            seen.lock().unwrap().errors,
            vec!["server reported an error: rate limited".to_string()]
        );
    }

    #[test]
    fn rejected_frames_invoke_nothing() {
        let (callbacks, seen) = recording();
        for frame in [
            "{{{",
            "42",
            r#"{"content":"no type"}"#,
            r#"{"type":"read_receipt","id":"m1"}"#,
            r#"{"type":"message","message":"not an object"}"#,
        ] {
            assert!(callbacks.route(frame).is_err(), "{frame} should be rejected");
        }
        assert_eq!(total(&seen.lock().unwrap()), 0);
    }

    #[test]
    fn missing_callbacks_are_fine() {
        let callbacks = Callbacks::new();
        assert_eq!(callbacks.route(r#"{"type":"typing","user_id":"u1"}"#).unwrap(), "typing");
        assert!(format!("{callbacks:?}").contains("on_message: false"));
    }
}
