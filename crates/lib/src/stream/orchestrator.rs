//! Read loop for one chat response: bytes → lines → events → state changes → render actions.
//!
//! An orchestrator lives for exactly one stream and owns all of that stream's mutable state, so
//! nothing leaks between sends. The pending indicator is shown on construction and dismissed exactly
//! once: on the first renderable event, at loop exit, or by `Drop` if the orchestrator is abandoned.

use super::conversation::{ConversationState, Message, SegmentChange, SegmentPolicy};
use super::decoder::ChunkDecoder;
use super::event::{EventParser, StreamEvent};
use super::tools::{CardState, CardUpdate, ToolCallCard, ToolCallTracker};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::ops::ControlFlow;

/// Instruction for the presentation layer. Carries no protocol knowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderAction {
    ShowPending,
    DismissPending,
    OpenAnswer { index: usize },
    AppendText { index: usize, text: String },
    /// Inline error annotation, styled apart from answer text.
    AppendError { index: usize, text: String },
    SealAnswer { index: usize },
    /// Also sent for a re-announced key; replaces that card's name and arguments.
    OpenToolCard { key: String, name: String, arguments: String },
    UpdateToolCard { key: String, state: CardState, text: Option<String> },
    StreamEnded { outcome: StreamOutcome },
}

/// How the read loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// An `end` event arrived.
    Ended,
    /// The body ran out without an `end` event.
    Closed,
    /// Transport failure, before or during the body.
    Failed(String),
}

/// Receives render actions and turns them into visible UI.
pub trait PresentationSink {
    fn render(&mut self, action: RenderAction);
}

impl<S: PresentationSink + ?Sized> PresentationSink for &mut S {
    fn render(&mut self, action: RenderAction) {
        (**self).render(action)
    }
}

/// Sink that keeps every action; used by tests and headless callers.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub actions: Vec<RenderAction>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&RenderAction) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(a)).count()
    }

    pub fn dismiss_count(&self) -> usize {
        self.count(|a| matches!(a, RenderAction::DismissPending))
    }
}

impl PresentationSink for RecordingSink {
    fn render(&mut self, action: RenderAction) {
        self.actions.push(action);
    }
}

/// Everything a finished stream leaves behind.
#[derive(Debug, Clone)]
pub struct StreamReport {
    pub outcome: StreamOutcome,
    /// Sealed assistant messages in creation order.
    pub messages: Vec<Message>,
    /// Final card snapshot; the registry itself does not outlive the stream.
    pub cards: Vec<ToolCallCard>,
    pub malformed_records: usize,
}

pub struct StreamOrchestrator<S: PresentationSink> {
    sink: S,
    decoder: ChunkDecoder,
    parser: EventParser,
    conversation: ConversationState,
    tools: ToolCallTracker,
    pending: bool,
}

impl<S: PresentationSink> StreamOrchestrator<S> {
    /// Start a stream: shows the pending indicator immediately.
    pub fn new(sink: S, policy: SegmentPolicy) -> Self {
        let mut this = Self {
            sink,
            decoder: ChunkDecoder::new(),
            parser: EventParser::new(),
            conversation: ConversationState::new(policy),
            tools: ToolCallTracker::new(),
            pending: true,
        };
        this.sink.render(RenderAction::ShowPending);
        this
    }

    /// Drive the loop until `end`, body exhaustion, or a read error.
    pub async fn run<B, E, St>(mut self, body: St) -> StreamReport
    where
        St: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut body = std::pin::pin!(body);
        let outcome = loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    if self.feed(chunk.as_ref()).is_break() {
                        break StreamOutcome::Ended;
                    }
                }
                Some(Err(e)) => {
                    log::warn!("stream: read failed: {}", e);
                    break StreamOutcome::Failed(e.to_string());
                }
                None => {
                    log::debug!("stream: body closed without end event");
                    break StreamOutcome::Closed;
                }
            }
        };
        self.finish(outcome)
    }

    /// The request failed before a body was available.
    pub fn fail(self, message: impl Into<String>) -> StreamReport {
        self.finish(StreamOutcome::Failed(message.into()))
    }

    /// Process one chunk. Breaks after an `end` event; later events in the chunk are not applied.
    pub fn feed(&mut self, chunk: &[u8]) -> ControlFlow<()> {
        for line in self.decoder.push(chunk) {
            let Some(event) = self.parser.parse(&line) else {
                continue;
            };
            if self.dispatch(event).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Seal, dismiss, and report. Used by every termination path.
    pub fn finish(mut self, outcome: StreamOutcome) -> StreamReport {
        self.decoder.finish();
        if let StreamOutcome::Failed(message) = &outcome {
            if !self.conversation.has_rendered_content() {
                let changes = self.conversation.on_error(message);
                self.emit_segments(changes);
            }
        }
        if let Some(change) = self.conversation.seal() {
            self.emit_segments([change]);
        }
        self.dismiss_pending();
        log::info!("stream: finished ({:?}), {} tool card(s)", outcome, self.tools.len());
        self.sink.render(RenderAction::StreamEnded {
            outcome: outcome.clone(),
        });
        StreamReport {
            outcome,
            messages: std::mem::take(&mut self.conversation).into_messages(),
            cards: std::mem::take(&mut self.tools).into_cards(),
            malformed_records: self.parser.malformed(),
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn tools(&self) -> &ToolCallTracker {
        &self.tools
    }

    fn dispatch(&mut self, event: StreamEvent) -> ControlFlow<()> {
        match event {
            StreamEvent::Content { text } => {
                self.dismiss_pending();
                let changes = self.conversation.on_content(&text);
                self.emit_segments(changes);
            }
            StreamEvent::ToolCalls { calls } => {
                self.dismiss_pending();
                for update in self.tools.announce(&calls) {
                    self.emit_card(update);
                }
                self.conversation.on_tool_calls();
            }
            StreamEvent::ToolExecution { call, args } => {
                self.dismiss_pending();
                let update = self.tools.mark_running(&call, args);
                self.emit_card(update);
            }
            StreamEvent::ToolResult { call, result } => {
                self.dismiss_pending();
                let update = self.tools.complete(&call, result);
                self.emit_card(update);
            }
            StreamEvent::Error { message } => {
                self.dismiss_pending();
                let changes = self.conversation.on_error(&message);
                self.emit_segments(changes);
            }
            StreamEvent::End => return ControlFlow::Break(()),
            StreamEvent::Unknown { kind } => {
                log::debug!("stream: ignoring event type {}", kind);
            }
        }
        ControlFlow::Continue(())
    }

    fn emit_segments(&mut self, changes: impl IntoIterator<Item = SegmentChange>) {
        for change in changes {
            let action = match change {
                SegmentChange::Opened { index } => RenderAction::OpenAnswer { index },
                SegmentChange::Text { index, text } => RenderAction::AppendText { index, text },
                SegmentChange::Error { index, text } => RenderAction::AppendError { index, text },
                SegmentChange::Sealed { index } => RenderAction::SealAnswer { index },
            };
            self.sink.render(action);
        }
    }

    fn emit_card(&mut self, update: CardUpdate) {
        let CardUpdate { created, card } = update;
        // cards only return to `announced` through a (re-)announcement
        if created || card.state == CardState::Announced {
            self.sink.render(RenderAction::OpenToolCard {
                key: card.key.clone(),
                name: card.name.clone(),
                arguments: card.arguments.clone(),
            });
        }
        if card.state != CardState::Announced {
            self.sink.render(RenderAction::UpdateToolCard {
                key: card.key,
                state: card.state,
                text: card.text,
            });
        }
    }

    fn dismiss_pending(&mut self) {
        if std::mem::replace(&mut self.pending, false) {
            self.sink.render(RenderAction::DismissPending);
        }
    }
}

impl<S: PresentationSink> Drop for StreamOrchestrator<S> {
    fn drop(&mut self) {
        self.dismiss_pending();
    }
}
