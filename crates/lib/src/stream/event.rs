//! Event records: `data: <json>` lines parsed into a closed [`StreamEvent`] sum type.
//!
//! Lines without the record prefix (blank separators, comments, stray output) are ignored.
//! A prefixed line whose payload does not parse is dropped and logged; the stream goes on.

use serde::Deserialize;
use serde_json::Value;

/// Prefix that marks an event record line.
pub const EVENT_PREFIX: &str = "data: ";

/// One typed event from the chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental answer text.
    Content { text: String },
    /// The model paused to call tools, in announcement order.
    ToolCalls { calls: Vec<ToolCallAnnouncement> },
    /// A call started running; `args` is the argument payload rendered as text.
    ToolExecution { call: CallRef, args: Option<String> },
    /// A call finished.
    ToolResult { call: CallRef, result: String },
    /// Server-side failure message; the stream may continue.
    Error { message: String },
    /// Terminal.
    End,
    /// Record with a discriminator this client does not know. Always a no-op.
    Unknown { kind: String },
}

/// A tool call as announced by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallAnnouncement {
    /// Call identifier; `None` when missing or empty on the wire.
    pub id: Option<String>,
    pub name: String,
    /// Raw argument text (usually JSON, not guaranteed well-formed).
    pub arguments: String,
}

/// Reference to a call carried by execution/result events. Either part may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl CallRef {
    pub fn new(id: Option<&str>, name: Option<&str>) -> Self {
        Self {
            id: non_empty(id.map(str::to_string)),
            name: non_empty(name.map(str::to_string)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event payload has no \"type\" discriminator")]
    MissingType,
}

/// Parse the JSON payload of one record (the text after [`EVENT_PREFIX`]).
pub fn parse_record(payload: &str) -> Result<StreamEvent, RecordError> {
    let value: Value = serde_json::from_str(payload)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(RecordError::MissingType)?
        .to_string();
    let event = match kind.as_str() {
        "content" => {
            let rec: ContentRecord = serde_json::from_value(value)?;
            StreamEvent::Content { text: rec.content }
        }
        "tool_calls" => {
            let rec: ToolCallsRecord = serde_json::from_value(value)?;
            StreamEvent::ToolCalls {
                calls: rec.tool_calls.into_iter().map(WireToolCall::into_announcement).collect(),
            }
        }
        "tool_execution" => {
            let rec: ToolRefRecord = serde_json::from_value(value)?;
            StreamEvent::ToolExecution {
                call: rec.call_ref(),
                args: rec.args.as_ref().and_then(payload_text),
            }
        }
        "tool_result" => {
            let rec: ToolRefRecord = serde_json::from_value(value)?;
            StreamEvent::ToolResult {
                call: rec.call_ref(),
                result: rec.result.as_ref().and_then(payload_text).unwrap_or_default(),
            }
        }
        "error" => {
            let rec: ErrorRecord = serde_json::from_value(value)?;
            StreamEvent::Error { message: rec.message }
        }
        "end" => StreamEvent::End,
        _ => StreamEvent::Unknown { kind },
    };
    Ok(event)
}

/// Line-level parser. Counts what it drops so callers can report it.
#[derive(Debug, Default)]
pub struct EventParser {
    malformed: usize,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` for non-record lines and for records whose payload is malformed.
    pub fn parse(&mut self, line: &str) -> Option<StreamEvent> {
        let payload = line.strip_prefix(EVENT_PREFIX)?;
        match parse_record(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                self.malformed += 1;
                log::warn!("stream: dropping malformed event record: {}", e);
                None
            }
        }
    }

    /// Number of prefixed lines dropped so far.
    pub fn malformed(&self) -> usize {
        self.malformed
    }
}

// --- wire types ---

#[derive(Debug, Deserialize)]
struct ContentRecord {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallsRecord {
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    function: Option<WireFunction>,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

impl WireToolCall {
    fn into_announcement(self) -> ToolCallAnnouncement {
        let (fn_name, arguments) = match self.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };
        ToolCallAnnouncement {
            id: non_empty(self.id),
            name: non_empty(fn_name).or(non_empty(self.name)).unwrap_or_default(),
            arguments: arguments.as_ref().and_then(payload_text).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolRefRecord {
    #[serde(default)]
    tool_call_id: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
}

impl ToolRefRecord {
    fn call_ref(&self) -> CallRef {
        CallRef::new(self.tool_call_id.as_deref(), self.tool_name.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorRecord {
    #[serde(default)]
    message: String,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Strings are taken as-is; other JSON values are rendered compactly. Null means absent.
fn payload_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_lines_without_prefix() {
        let mut p = EventParser::new();
        assert_eq!(p.parse(""), None);
        assert_eq!(p.parse(": keep-alive"), None);
        assert_eq!(p.parse("data:{\"type\":\"end\"}"), None);
        assert_eq!(p.malformed(), 0);
    }

    #[test]
    fn parses_content_and_end() {
        let mut p = EventParser::new();
        assert_eq!(
            p.parse(r#"data: {"type":"content","content":"Hi"}"#),
            Some(StreamEvent::Content { text: "Hi".into() })
        );
        assert_eq!(p.parse(r#"data: {"type":"end"}"#), Some(StreamEvent::End));
    }

    #[test]
    fn parses_tool_calls_in_order() {
        let line = r#"data: {"type":"tool_calls","tool_calls":[
            {"id":"call_1","function":{"name":"calc","arguments":"{\"expr\":\"6*7\"}"}},
            {"id":"","function":{"name":"time","arguments":""}}]}"#
            .replace('\n', "");
        let ev = EventParser::new().parse(&line).unwrap();
        let StreamEvent::ToolCalls { calls } = ev else {
            panic!("expected tool_calls, got {:?}", ev);
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].name, "calc");
        assert_eq!(calls[0].arguments, r#"{"expr":"6*7"}"#);
        assert_eq!(calls[1].id, None);
        assert_eq!(calls[1].name, "time");
    }

    #[test]
    fn execution_args_object_rendered_as_text() {
        let ev = EventParser::new()
            .parse(r#"data: {"type":"tool_execution","tool_name":"calc","tool_call_id":"a","args":{"x":1}}"#)
            .unwrap();
        assert_eq!(
            ev,
            StreamEvent::ToolExecution {
                call: CallRef::new(Some("a"), Some("calc")),
                args: Some(r#"{"x":1}"#.into()),
            }
        );
    }

    #[test]
    fn result_without_identifier_keeps_name() {
        let ev = EventParser::new()
            .parse(r#"data: {"type":"tool_result","tool_name":"calc","result":"42"}"#)
            .unwrap();
        assert_eq!(
            ev,
            StreamEvent::ToolResult {
                call: CallRef { id: None, name: Some("calc".into()) },
                result: "42".into(),
            }
        );
    }

    #[test]
    fn unknown_type_is_explicit_noop_variant() {
        let ev = EventParser::new().parse(r#"data: {"type":"usage","tokens":3}"#);
        assert_eq!(ev, Some(StreamEvent::Unknown { kind: "usage".into() }));
    }

    #[test]
    fn malformed_payloads_are_dropped_and_counted() {
        let mut p = EventParser::new();
        assert_eq!(p.parse("data: {not json"), None);
        assert_eq!(p.parse(r#"data: {"content":"no type"}"#), None);
        assert_eq!(p.parse(r#"data: {"type":"content","content":5}"#), None);
        assert_eq!(p.malformed(), 3);
        assert_eq!(
            p.parse(r#"data: {"type":"error","message":"boom"}"#),
            Some(StreamEvent::Error { message: "boom".into() })
        );
    }
}
