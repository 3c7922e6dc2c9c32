//! Client-side conversation session: server-assigned id plus a local message cache.
//!
//! The authoritative history lives on the backend; the cache only mirrors what this client sent
//! and rendered. The id is assigned by the server on the first exchange and never changes after
//! that; clearing the session drops both the id and the cache.

use crate::stream::{Message, Role};

/// Opaque session identifier issued by the backend.
pub type SessionId = String;

#[derive(Debug, Clone, Default)]
pub struct Session {
    id: Option<SessionId>,
    messages: Vec<Message>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue an existing server-side session.
    pub fn resume(id: impl Into<SessionId>) -> Self {
        Self {
            id: Some(id.into()),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Record the id returned by the backend. Only the first id sticks; returns whether it was taken.
    pub fn assign_id(&mut self, id: impl Into<SessionId>) -> bool {
        let id = id.into();
        match &self.id {
            None => {
                log::debug!("session: assigned id {}", id);
                self.id = Some(id);
                true
            }
            Some(current) if *current == id => false,
            Some(current) => {
                log::warn!("session: backend returned id {} but session is {}; keeping it", id, current);
                false
            }
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    /// Add sealed assistant messages from a finished stream. Empty messages are skipped.
    pub fn extend_assistant(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(
            messages
                .into_iter()
                .filter(|m| m.role == Role::Assistant && !m.is_empty()),
        );
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Forget everything, including the id.
    pub fn clear(&mut self) {
        self.id = None;
        self.messages.clear();
    }
}
