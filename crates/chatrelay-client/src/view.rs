//! Client-side chat view (message list + user list).

use chatrelay_core::{Envelope, ServerEvent, UserEntry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    pub messages: Vec<Envelope>,
    pub users: Vec<UserEntry>,
}

impl ChatView {
    /// Fold one server event into the view.
    ///
    /// `message_log` and `users` replace their list wholesale; a broadcast
    /// envelope is appended without dedup against optimistic copies.
    pub fn apply(&mut self, ev: &ServerEvent) {
        match ev {
            ServerEvent::MessageLog(log) => self.messages = log.clone(),
            ServerEvent::Users(users) => self.users = users.clone(),
            ServerEvent::ChatMessage(env) => self.messages.push(env.clone()),
            ServerEvent::Error(err) => {
                tracing::warn!(code = %err.code, msg = %err.msg, "node rejected a frame");
            }
        }
    }

    /// Optimistic local copy of a message this client just sent.
    pub fn echo(&mut self, env: Envelope) {
        self.messages.push(env);
    }
}
