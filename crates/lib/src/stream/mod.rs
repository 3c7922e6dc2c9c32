//! Client side of the chat event stream.
//!
//! Data flows one way: bytes ([`decoder`]) → event records ([`event`]) → answer segments
//! ([`conversation`]) and tool-call cards ([`tools`]) → render actions for a [`PresentationSink`]
//! ([`orchestrator`]).

pub mod conversation;
pub mod decoder;
pub mod event;
pub mod orchestrator;
pub mod tools;

pub use conversation::{
    ConversationState, Fragment, Message, Role, SegmentChange, SegmentPolicy,
    DEFAULT_REASONING_MARKER,
};
pub use decoder::ChunkDecoder;
pub use event::{
    parse_record, CallRef, EventParser, RecordError, StreamEvent, ToolCallAnnouncement,
    EVENT_PREFIX,
};
pub use orchestrator::{
    PresentationSink, RecordingSink, RenderAction, StreamOrchestrator, StreamOutcome,
    StreamReport,
};
pub use tools::{CardState, CardUpdate, ToolCallCard, ToolCallTracker};
