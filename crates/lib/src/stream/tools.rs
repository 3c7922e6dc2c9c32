//! Tool-call cards for one stream: announced → running → completed.
//!
//! Cards are keyed by call id, or by tool name when the announcement carried no id. Execution and
//! result events resolve their card by id first and fall back to the tool name, because those events
//! do not always carry the id. Two concurrent id-less calls to the same tool share one card.

use super::event::{CallRef, ToolCallAnnouncement};
use serde::Serialize;
use std::collections::HashMap;

/// Key used when an event names neither an id nor a tool.
const UNNAMED_KEY: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Announced,
    Running,
    Completed,
}

/// UI-facing lifecycle entry for one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallCard {
    pub key: String,
    pub name: String,
    pub arguments: String,
    pub state: CardState,
    /// Last status text while running, then the result text once completed.
    pub text: Option<String>,
}

/// What happened to a card. `created` is set when the card did not exist before this event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardUpdate {
    pub created: bool,
    pub card: ToolCallCard,
}

/// Registry of cards for the current stream, in first-seen order.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    cards: Vec<ToolCallCard>,
    by_key: HashMap<String, usize>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register announced calls in order. A repeated key resets that card instead of adding one.
    pub fn announce(&mut self, calls: &[ToolCallAnnouncement]) -> Vec<CardUpdate> {
        calls
            .iter()
            .map(|call| {
                let key = card_key(call.id.as_deref(), Some(call.name.as_str()));
                match self.by_key.get(&key).copied() {
                    Some(idx) => {
                        let card = &mut self.cards[idx];
                        card.name = call.name.clone();
                        card.arguments = call.arguments.clone();
                        card.state = CardState::Announced;
                        card.text = None;
                        CardUpdate {
                            created: false,
                            card: card.clone(),
                        }
                    }
                    None => {
                        let card = ToolCallCard {
                            key: key.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            state: CardState::Announced,
                            text: None,
                        };
                        self.insert(card.clone());
                        CardUpdate {
                            created: true,
                            card,
                        }
                    }
                }
            })
            .collect()
    }

    /// Move the referenced card to `running`, synthesizing it when nothing matches.
    /// `status` replaces the card text when present.
    pub fn mark_running(&mut self, call: &CallRef, status: Option<String>) -> CardUpdate {
        let (idx, created) = self.resolve_or_create(call);
        let card = &mut self.cards[idx];
        card.state = CardState::Running;
        if status.is_some() {
            card.text = status;
        }
        CardUpdate {
            created,
            card: card.clone(),
        }
    }

    /// Move the referenced card to `completed`; the result replaces any status text.
    pub fn complete(&mut self, call: &CallRef, result: String) -> CardUpdate {
        let (idx, created) = self.resolve_or_create(call);
        let card = &mut self.cards[idx];
        card.state = CardState::Completed;
        card.text = Some(result);
        CardUpdate {
            created,
            card: card.clone(),
        }
    }

    /// Find the card an execution/result event refers to.
    ///
    /// Order: exact id key, then a card keyed by the tool name (or `unknown` when the event names
    /// no tool), then the first not yet completed
    /// card with that tool name, then the most recent card with that tool name.
    pub fn resolve(&self, call: &CallRef) -> Option<&ToolCallCard> {
        self.resolve_index(call).map(|idx| &self.cards[idx])
    }

    pub fn get(&self, key: &str) -> Option<&ToolCallCard> {
        self.by_key.get(key).map(|&idx| &self.cards[idx])
    }

    pub fn cards(&self) -> &[ToolCallCard] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn into_cards(self) -> Vec<ToolCallCard> {
        self.cards
    }

    fn resolve_index(&self, call: &CallRef) -> Option<usize> {
        if let Some(idx) = call.id.as_ref().and_then(|id| self.by_key.get(id)) {
            return Some(*idx);
        }
        if let Some(idx) = self.by_key.get(&key_for_name(call.name.as_deref())) {
            return Some(*idx);
        }
        let name = call.name.as_deref().filter(|n| !n.is_empty())?;
        self.cards
            .iter()
            .position(|c| c.name == name && c.state != CardState::Completed)
            .or_else(|| self.cards.iter().rposition(|c| c.name == name))
    }

    fn resolve_or_create(&mut self, call: &CallRef) -> (usize, bool) {
        if let Some(idx) = self.resolve_index(call) {
            return (idx, false);
        }
        let key = card_key(call.id.as_deref(), call.name.as_deref());
        log::debug!("stream: no announced tool call for {:?}, creating card {}", call, key);
        self.insert(ToolCallCard {
            key,
            name: call.name.clone().unwrap_or_default(),
            arguments: String::new(),
            state: CardState::Announced,
            text: None,
        });
        (self.cards.len() - 1, true)
    }

    fn insert(&mut self, card: ToolCallCard) {
        self.by_key.insert(card.key.clone(), self.cards.len());
        self.cards.push(card);
    }
}

fn card_key(id: Option<&str>, name: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => key_for_name(name),
    }
}

fn key_for_name(name: Option<&str>) -> String {
    match name {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => UNNAMED_KEY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(id: Option<&str>, name: &str) -> ToolCallAnnouncement {
        ToolCallAnnouncement {
            id: id.map(str::to_string),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn lifecycle_by_id() {
        let mut t = ToolCallTracker::new();
        let created = t.announce(&[announcement(Some("a"), "calc")]);
        assert!(created[0].created);
        assert_eq!(created[0].card.state, CardState::Announced);

        let running = t.mark_running(&CallRef::new(Some("a"), Some("calc")), Some("{\"x\":1}".into()));
        assert!(!running.created);
        assert_eq!(running.card.state, CardState::Running);
        assert_eq!(running.card.text.as_deref(), Some("{\"x\":1}"));

        let done = t.complete(&CallRef::new(Some("a"), None), "42".into());
        assert_eq!(done.card.state, CardState::Completed);
        assert_eq!(done.card.text.as_deref(), Some("42"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn announcement_order_is_preserved() {
        let mut t = ToolCallTracker::new();
        t.announce(&[
            announcement(Some("c1"), "calc"),
            announcement(Some("c2"), "time"),
            announcement(None, "echo"),
        ]);
        let keys: Vec<_> = t.cards().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["c1", "c2", "echo"]);
    }

    #[test]
    fn repeated_key_updates_instead_of_duplicating() {
        let mut t = ToolCallTracker::new();
        t.announce(&[announcement(Some("a"), "calc")]);
        t.complete(&CallRef::new(Some("a"), None), "1".into());
        let again = t.announce(&[announcement(Some("a"), "calc")]);
        assert!(!again[0].created);
        assert_eq!(again[0].card.state, CardState::Announced);
        assert_eq!(again[0].card.text, None);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn result_without_id_falls_back_to_name() {
        let mut t = ToolCallTracker::new();
        t.announce(&[announcement(Some("call_9"), "calc")]);
        let done = t.complete(&CallRef::new(None, Some("calc")), "ok".into());
        assert!(!done.created);
        assert_eq!(done.card.key, "call_9");
    }

    #[test]
    fn mismatched_id_falls_back_to_name() {
        let mut t = ToolCallTracker::new();
        t.announce(&[announcement(Some("call_1"), "calc")]);
        let run = t.mark_running(&CallRef::new(Some("other"), Some("calc")), None);
        assert!(!run.created);
        assert_eq!(run.card.key, "call_1");
    }

    #[test]
    fn name_fallback_prefers_first_unfinished_card() {
        let mut t = ToolCallTracker::new();
        t.announce(&[announcement(Some("a"), "calc"), announcement(Some("b"), "calc")]);
        let first = t.complete(&CallRef::new(None, Some("calc")), "1".into());
        assert_eq!(first.card.key, "a");
        let second = t.complete(&CallRef::new(None, Some("calc")), "2".into());
        assert_eq!(second.card.key, "b");
        let third = t.complete(&CallRef::new(None, Some("calc")), "3".into());
        assert_eq!(third.card.key, "b");
        assert_eq!(t.get("a").and_then(|c| c.text.as_deref()), Some("1"));
    }

    #[test]
    fn id_less_calls_with_same_name_collapse() {
        let mut t = ToolCallTracker::new();
        let updates = t.announce(&[announcement(None, "calc"), announcement(None, "calc")]);
        assert!(updates[0].created);
        assert!(!updates[1].created);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn unknown_reference_synthesizes_card() {
        let mut t = ToolCallTracker::new();
        let done = t.complete(&CallRef::new(Some("ghost"), Some("calc")), "r".into());
        assert!(done.created);
        assert_eq!(done.card.key, "ghost");
        assert_eq!(done.card.name, "calc");
        assert_eq!(done.card.state, CardState::Completed);

        let anon = t.mark_running(&CallRef::default(), None);
        assert!(anon.created);
        assert_eq!(anon.card.key, "unknown");
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn anonymous_references_share_one_card() {
        let mut t = ToolCallTracker::new();
        let first = t.complete(&CallRef::default(), "r1".into());
        assert!(first.created);
        let second = t.complete(&CallRef::default(), "r2".into());
        assert!(!second.created);
        assert_eq!(second.card.key, "unknown");
        assert_eq!(second.card.text.as_deref(), Some("r2"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn nameless_announcement_is_found_by_anonymous_result() {
        let mut t = ToolCallTracker::new();
        t.announce(&[announcement(None, "")]);
        let done = t.complete(&CallRef::default(), "ok".into());
        assert!(!done.created);
        assert_eq!(done.card.key, "unknown");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn running_without_status_keeps_previous_text() {
        let mut t = ToolCallTracker::new();
        t.announce(&[announcement(Some("a"), "calc")]);
        t.mark_running(&CallRef::new(Some("a"), None), Some("first".into()));
        let again = t.mark_running(&CallRef::new(Some("a"), None), None);
        assert_eq!(again.card.text.as_deref(), Some("first"));
    }
}
