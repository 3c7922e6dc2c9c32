//! Answer-in-progress state: which assistant message is open and when a new one starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header the backend emits at the start of every model round's reasoning trace.
pub const DEFAULT_REASONING_MARKER: &str = "思考过程";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A piece of message body. Errors are kept apart from answer text so sinks can style them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Fragment {
    Text(String),
    Error(String),
}

/// One chat message. Assistant messages grow while their stream is open and are frozen once sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub body: Vec<Fragment>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: vec![Fragment::Text(text.into())],
            created_at: Utc::now(),
        }
    }

    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            body: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Answer text only, without inline error annotations.
    pub fn content(&self) -> String {
        self.body
            .iter()
            .filter_map(|f| match f {
                Fragment::Text(t) => Some(t.as_str()),
                Fragment::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|f| match f {
            Fragment::Error(e) => Some(e.as_str()),
            Fragment::Text(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.body.iter().all(|f| match f {
            Fragment::Text(t) | Fragment::Error(t) => t.is_empty(),
        })
    }

    fn push_text(&mut self, text: &str) {
        match self.body.last_mut() {
            Some(Fragment::Text(t)) => t.push_str(text),
            _ => self.body.push(Fragment::Text(text.to_string())),
        }
    }

    fn push_error(&mut self, text: &str) {
        self.body.push(Fragment::Error(text.to_string()));
    }
}

/// When arriving content starts a new assistant message.
///
/// Both variants open a segment on the first content of a stream and on the first content
/// after a `tool_calls` event. `ReasoningMarker` also opens one when a fragment carries the
/// reasoning-trace header while the open message already has text, which is how a fresh model
/// round shows up in the text itself.
// TODO: replace text sniffing with an explicit phase field once the backend sends one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentPolicy {
    ToolBoundary,
    ReasoningMarker(String),
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        SegmentPolicy::ReasoningMarker(DEFAULT_REASONING_MARKER.to_string())
    }
}

impl SegmentPolicy {
    fn starts_round(&self, fragment: &str, open: &Message) -> bool {
        match self {
            SegmentPolicy::ToolBoundary => false,
            SegmentPolicy::ReasoningMarker(marker) => {
                !marker.is_empty() && fragment.contains(marker.as_str()) && !open.is_empty()
            }
        }
    }
}

/// Effect of one event on the answer messages. `index` counts assistant messages of this stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentChange {
    Opened { index: usize },
    Text { index: usize, text: String },
    Error { index: usize, text: String },
    Sealed { index: usize },
}

/// Owns the open assistant message and everything sealed before it in the current stream.
#[derive(Debug, Default)]
pub struct ConversationState {
    policy: SegmentPolicy,
    open: Option<Message>,
    sealed: Vec<Message>,
    start_new_segment: bool,
    rendered_content: bool,
}

impl ConversationState {
    pub fn new(policy: SegmentPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Apply a `content` event. Empty fragments change nothing.
    pub fn on_content(&mut self, text: &str) -> Vec<SegmentChange> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut changes = Vec::new();
        let new_segment = match &self.open {
            None => true,
            Some(open) => self.start_new_segment || self.policy.starts_round(text, open),
        };
        if new_segment {
            changes.extend(self.seal_open());
            changes.push(self.open_new());
        }
        self.start_new_segment = false;
        self.rendered_content = true;
        let index = self.open_index();
        if let Some(open) = self.open.as_mut() {
            open.push_text(text);
        }
        changes.push(SegmentChange::Text {
            index,
            text: text.to_string(),
        });
        changes
    }

    /// A `tool_calls` event was processed: the next content belongs to a new message.
    pub fn on_tool_calls(&mut self) {
        self.start_new_segment = true;
    }

    /// Append an error annotation to the open message, opening one if needed.
    pub fn on_error(&mut self, message: &str) -> Vec<SegmentChange> {
        let mut changes = Vec::new();
        if self.open.is_none() {
            changes.push(self.open_new());
        }
        let index = self.open_index();
        if let Some(open) = self.open.as_mut() {
            open.push_error(message);
        }
        changes.push(SegmentChange::Error {
            index,
            text: message.to_string(),
        });
        changes
    }

    /// Seal whatever is open. Idempotent.
    pub fn seal(&mut self) -> Option<SegmentChange> {
        self.seal_open()
    }

    /// True once any content fragment has been rendered in this stream.
    pub fn has_rendered_content(&self) -> bool {
        self.rendered_content
    }

    pub fn is_awaiting_new_segment(&self) -> bool {
        self.start_new_segment
    }

    pub fn open_message(&self) -> Option<&Message> {
        self.open.as_ref()
    }

    pub fn sealed(&self) -> &[Message] {
        &self.sealed
    }

    /// Seal and hand over every assistant message of the stream, in creation order.
    pub fn into_messages(mut self) -> Vec<Message> {
        self.seal_open();
        self.sealed
    }

    fn open_index(&self) -> usize {
        self.sealed.len()
    }

    fn open_new(&mut self) -> SegmentChange {
        self.open = Some(Message::assistant());
        SegmentChange::Opened {
            index: self.open_index(),
        }
    }

    fn seal_open(&mut self) -> Option<SegmentChange> {
        let msg = self.open.take()?;
        let index = self.sealed.len();
        self.sealed.push(msg);
        Some(SegmentChange::Sealed { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_content_opens_one_message() {
        let mut c = ConversationState::new(SegmentPolicy::ToolBoundary);
        let changes = c.on_content("Hi");
        assert_eq!(
            changes,
            vec![
                SegmentChange::Opened { index: 0 },
                SegmentChange::Text { index: 0, text: "Hi".into() },
            ]
        );
        let msgs = c.into_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content(), "Hi");
        assert_eq!(msgs[0].role, Role::Assistant);
    }

    #[test]
    fn following_content_appends() {
        let mut c = ConversationState::default();
        c.on_content("Hel");
        let changes = c.on_content("lo");
        assert_eq!(changes, vec![SegmentChange::Text { index: 0, text: "lo".into() }]);
        assert_eq!(c.open_message().map(Message::content).as_deref(), Some("Hello"));
    }

    #[test]
    fn tool_calls_split_answer_into_two_messages() {
        let mut c = ConversationState::new(SegmentPolicy::ToolBoundary);
        c.on_content("A");
        c.on_tool_calls();
        assert!(c.is_awaiting_new_segment());
        let changes = c.on_content("B");
        assert_eq!(
            changes,
            vec![
                SegmentChange::Sealed { index: 0 },
                SegmentChange::Opened { index: 1 },
                SegmentChange::Text { index: 1, text: "B".into() },
            ]
        );
        assert!(!c.is_awaiting_new_segment());
        c.on_content("C");
        let msgs = c.into_messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content(), "A");
        assert_eq!(msgs[1].content(), "BC");
    }

    #[test]
    fn reasoning_marker_starts_new_round() {
        let mut c = ConversationState::default();
        c.on_content("=====思考过程=====\n");
        c.on_content("thinking");
        // marker in a later fragment with text already present opens a new message
        let changes = c.on_content("\n=====思考过程=====\n");
        assert!(changes.contains(&SegmentChange::Opened { index: 1 }));
        assert_eq!(c.sealed().len(), 1);
    }

    #[test]
    fn tool_boundary_policy_ignores_marker() {
        let mut c = ConversationState::new(SegmentPolicy::ToolBoundary);
        c.on_content("x");
        let changes = c.on_content("思考过程");
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn error_without_open_message_creates_one() {
        let mut c = ConversationState::default();
        let changes = c.on_error("boom");
        assert_eq!(
            changes,
            vec![
                SegmentChange::Opened { index: 0 },
                SegmentChange::Error { index: 0, text: "boom".into() },
            ]
        );
        assert!(!c.has_rendered_content());
        let msgs = c.into_messages();
        assert_eq!(msgs[0].content(), "");
        assert_eq!(msgs[0].errors().collect::<Vec<_>>(), vec!["boom"]);
    }

    #[test]
    fn error_appends_to_open_message_and_text_continues() {
        let mut c = ConversationState::default();
        c.on_content("partial");
        let changes = c.on_error("oops");
        assert_eq!(changes, vec![SegmentChange::Error { index: 0, text: "oops".into() }]);
        c.on_content(" more");
        let msgs = c.into_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            msgs[0].body,
            vec![
                Fragment::Text("partial".into()),
                Fragment::Error("oops".into()),
                Fragment::Text(" more".into()),
            ]
        );
    }

    #[test]
    fn empty_fragment_is_ignored() {
        let mut c = ConversationState::default();
        assert!(c.on_content("").is_empty());
        assert!(c.open_message().is_none());
    }

    #[test]
    fn seal_is_idempotent() {
        let mut c = ConversationState::default();
        c.on_content("x");
        assert_eq!(c.seal(), Some(SegmentChange::Sealed { index: 0 }));
        assert_eq!(c.seal(), None);
    }
}
