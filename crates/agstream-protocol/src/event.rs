//! Streamed protocol events.
//!
//! Each SSE payload decodes into one [`Event`]: a closed [`EventKind`]
//! variant plus the capture timestamp and a copy of the undecoded document.
//!
//! Decoding is lenient about everything but the discriminator: a missing
//! `type` is an error, an unknown `type` becomes [`EventKind::Raw`], and
//! missing or mistyped fields default to empty values.

use crate::error::{ProtocolError, ProtocolResult};
use crate::fields;
use crate::message::{Message, Role};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

const MESSAGE_ID: &[&str] = &["messageId", "message_id"];
const TOOL_CALL_ID: &[&str] = &["toolCallId", "tool_call_id"];
const TOOL_CALL_NAME: &[&str] = &["toolCallName", "tool_call_name"];
const PARENT_MESSAGE_ID: &[&str] = &["parentMessageId", "parent_message_id"];
const THREAD_ID: &[&str] = &["threadId", "thread_id"];
const RUN_ID: &[&str] = &["runId", "run_id"];
const STEP_ID: &[&str] = &["stepId", "step_id", "stepName"];
const DELTA: &[&str] = &["delta", "content"];
const TOOL_RESULT: &[&str] = &["result", "content"];
const PATCH: &[&str] = &["delta", "patch"];
const ERROR_MESSAGE: &[&str] = &["message", "error"];
const CUSTOM_TYPE: &[&str] = &["eventType", "event_type", "name"];
const CUSTOM_DATA: &[&str] = &["data", "value"];

/// Wire discriminator of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    TextMessageStart,
    TextMessageContent,
    TextMessageEnd,
    TextMessageChunk,
    ThinkingTextMessageStart,
    ThinkingTextMessageContent,
    ThinkingTextMessageEnd,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    ToolCallChunk,
    ToolCallResult,
    ThinkingStart,
    ThinkingEnd,
    StateSnapshot,
    StateDelta,
    MessagesSnapshot,
    RunStarted,
    RunFinished,
    RunError,
    StepStarted,
    StepFinished,
    Raw,
    Custom,
}

impl EventType {
    /// Every event type, in wire-table order.
    pub const ALL: [EventType; 24] = [
        EventType::TextMessageStart,
        EventType::TextMessageContent,
        EventType::TextMessageEnd,
        EventType::TextMessageChunk,
        EventType::ThinkingTextMessageStart,
        EventType::ThinkingTextMessageContent,
        EventType::ThinkingTextMessageEnd,
        EventType::ToolCallStart,
        EventType::ToolCallArgs,
        EventType::ToolCallEnd,
        EventType::ToolCallChunk,
        EventType::ToolCallResult,
        EventType::ThinkingStart,
        EventType::ThinkingEnd,
        EventType::StateSnapshot,
        EventType::StateDelta,
        EventType::MessagesSnapshot,
        EventType::RunStarted,
        EventType::RunFinished,
        EventType::RunError,
        EventType::StepStarted,
        EventType::StepFinished,
        EventType::Raw,
        EventType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TextMessageStart => "TEXT_MESSAGE_START",
            EventType::TextMessageContent => "TEXT_MESSAGE_CONTENT",
            EventType::TextMessageEnd => "TEXT_MESSAGE_END",
            EventType::TextMessageChunk => "TEXT_MESSAGE_CHUNK",
            EventType::ThinkingTextMessageStart => "THINKING_TEXT_MESSAGE_START",
            EventType::ThinkingTextMessageContent => "THINKING_TEXT_MESSAGE_CONTENT",
            EventType::ThinkingTextMessageEnd => "THINKING_TEXT_MESSAGE_END",
            EventType::ToolCallStart => "TOOL_CALL_START",
            EventType::ToolCallArgs => "TOOL_CALL_ARGS",
            EventType::ToolCallEnd => "TOOL_CALL_END",
            EventType::ToolCallChunk => "TOOL_CALL_CHUNK",
            EventType::ToolCallResult => "TOOL_CALL_RESULT",
            EventType::ThinkingStart => "THINKING_START",
            EventType::ThinkingEnd => "THINKING_END",
            EventType::StateSnapshot => "STATE_SNAPSHOT",
            EventType::StateDelta => "STATE_DELTA",
            EventType::MessagesSnapshot => "MESSAGES_SNAPSHOT",
            EventType::RunStarted => "RUN_STARTED",
            EventType::RunFinished => "RUN_FINISHED",
            EventType::RunError => "RUN_ERROR",
            EventType::StepStarted => "STEP_STARTED",
            EventType::StepFinished => "STEP_FINISHED",
            EventType::Raw => "RAW",
            EventType::Custom => "CUSTOM",
        }
    }

    /// Exact-match lookup of a wire discriminator.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessageStartEvent {
    pub message_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessageContentEvent {
    pub message_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessageEndEvent {
    pub message_id: String,
}

/// Self-contained text fragment; creates its message on first sight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessageChunkEvent {
    pub message_id: String,
    pub role: Option<Role>,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingTextMessageContentEvent {
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallStartEvent {
    pub tool_call_id: String,
    pub tool_call_name: String,
    pub parent_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallArgsEvent {
    pub tool_call_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallEndEvent {
    pub tool_call_id: String,
}

/// Self-contained tool-call fragment; creates its tool call on first sight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallChunkEvent {
    pub tool_call_id: String,
    pub tool_call_name: Option<String>,
    pub parent_message_id: Option<String>,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResultEvent {
    /// Id for the synthesized tool message, if the server supplies one.
    pub message_id: Option<String>,
    pub tool_call_id: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinkingStartEvent {
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshotEvent {
    pub snapshot: Value,
}

/// Patch operations, kept undecoded until the patch engine applies them.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDeltaEvent {
    pub delta: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagesSnapshotEvent {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStartedEvent {
    pub thread_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunFinishedEvent {
    pub thread_id: String,
    pub run_id: String,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunErrorEvent {
    pub message: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStartedEvent {
    pub step_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFinishedEvent {
    pub step_id: String,
}

/// Pass-through payload, also used for unrecognized discriminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub data: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomEvent {
    pub event_type: String,
    pub data: Value,
}

/// Typed payload of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    TextMessageStart(TextMessageStartEvent),
    TextMessageContent(TextMessageContentEvent),
    TextMessageEnd(TextMessageEndEvent),
    TextMessageChunk(TextMessageChunkEvent),
    ThinkingTextMessageStart,
    ThinkingTextMessageContent(ThinkingTextMessageContentEvent),
    ThinkingTextMessageEnd,
    ToolCallStart(ToolCallStartEvent),
    ToolCallArgs(ToolCallArgsEvent),
    ToolCallEnd(ToolCallEndEvent),
    ToolCallChunk(ToolCallChunkEvent),
    ToolCallResult(ToolCallResultEvent),
    ThinkingStart(ThinkingStartEvent),
    ThinkingEnd,
    StateSnapshot(StateSnapshotEvent),
    StateDelta(StateDeltaEvent),
    MessagesSnapshot(MessagesSnapshotEvent),
    RunStarted(RunStartedEvent),
    RunFinished(RunFinishedEvent),
    RunError(RunErrorEvent),
    StepStarted(StepStartedEvent),
    StepFinished(StepFinishedEvent),
    Raw(RawEvent),
    Custom(CustomEvent),
}

macro_rules! impl_from_payload {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for EventKind {
                fn from(payload: $payload) -> Self {
                    EventKind::$variant(payload)
                }
            }

            impl From<$payload> for Event {
                fn from(payload: $payload) -> Self {
                    Event::new(EventKind::$variant(payload))
                }
            }
        )*
    };
}

impl_from_payload! {
    TextMessageStartEvent => TextMessageStart,
    TextMessageContentEvent => TextMessageContent,
    TextMessageEndEvent => TextMessageEnd,
    TextMessageChunkEvent => TextMessageChunk,
    ThinkingTextMessageContentEvent => ThinkingTextMessageContent,
    ToolCallStartEvent => ToolCallStart,
    ToolCallArgsEvent => ToolCallArgs,
    ToolCallEndEvent => ToolCallEnd,
    ToolCallChunkEvent => ToolCallChunk,
    ToolCallResultEvent => ToolCallResult,
    ThinkingStartEvent => ThinkingStart,
    StateSnapshotEvent => StateSnapshot,
    StateDeltaEvent => StateDelta,
    MessagesSnapshotEvent => MessagesSnapshot,
    RunStartedEvent => RunStarted,
    RunFinishedEvent => RunFinished,
    RunErrorEvent => RunError,
    StepStartedEvent => StepStarted,
    StepFinishedEvent => StepFinished,
    RawEvent => Raw,
    CustomEvent => Custom,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::TextMessageStart(_) => EventType::TextMessageStart,
            EventKind::TextMessageContent(_) => EventType::TextMessageContent,
            EventKind::TextMessageEnd(_) => EventType::TextMessageEnd,
            EventKind::TextMessageChunk(_) => EventType::TextMessageChunk,
            EventKind::ThinkingTextMessageStart => EventType::ThinkingTextMessageStart,
            EventKind::ThinkingTextMessageContent(_) => EventType::ThinkingTextMessageContent,
            EventKind::ThinkingTextMessageEnd => EventType::ThinkingTextMessageEnd,
            EventKind::ToolCallStart(_) => EventType::ToolCallStart,
            EventKind::ToolCallArgs(_) => EventType::ToolCallArgs,
            EventKind::ToolCallEnd(_) => EventType::ToolCallEnd,
            EventKind::ToolCallChunk(_) => EventType::ToolCallChunk,
            EventKind::ToolCallResult(_) => EventType::ToolCallResult,
            EventKind::ThinkingStart(_) => EventType::ThinkingStart,
            EventKind::ThinkingEnd => EventType::ThinkingEnd,
            EventKind::StateSnapshot(_) => EventType::StateSnapshot,
            EventKind::StateDelta(_) => EventType::StateDelta,
            EventKind::MessagesSnapshot(_) => EventType::MessagesSnapshot,
            EventKind::RunStarted(_) => EventType::RunStarted,
            EventKind::RunFinished(_) => EventType::RunFinished,
            EventKind::RunError(_) => EventType::RunError,
            EventKind::StepStarted(_) => EventType::StepStarted,
            EventKind::StepFinished(_) => EventType::StepFinished,
            EventKind::Raw(_) => EventType::Raw,
            EventKind::Custom(_) => EventType::Custom,
        }
    }

    /// Decode the fields of a known event type from `doc`.
    fn decode_fields(event_type: EventType, doc: &Value) -> Self {
        use fields::{array, opt_string, string, value};

        match event_type {
            EventType::TextMessageStart => EventKind::TextMessageStart(TextMessageStartEvent {
                message_id: string(doc, MESSAGE_ID),
                role: opt_string(doc, &["role"])
                    .and_then(|r| Role::parse(&r))
                    .unwrap_or(Role::Assistant),
            }),
            EventType::TextMessageContent => {
                EventKind::TextMessageContent(TextMessageContentEvent {
                    message_id: string(doc, MESSAGE_ID),
                    delta: string(doc, DELTA),
                })
            }
            EventType::TextMessageEnd => EventKind::TextMessageEnd(TextMessageEndEvent {
                message_id: string(doc, MESSAGE_ID),
            }),
            EventType::TextMessageChunk => EventKind::TextMessageChunk(TextMessageChunkEvent {
                message_id: string(doc, MESSAGE_ID),
                role: opt_string(doc, &["role"]).and_then(|r| Role::parse(&r)),
                delta: string(doc, DELTA),
            }),
            EventType::ThinkingTextMessageStart => EventKind::ThinkingTextMessageStart,
            EventType::ThinkingTextMessageContent => {
                EventKind::ThinkingTextMessageContent(ThinkingTextMessageContentEvent {
                    delta: string(doc, DELTA),
                })
            }
            EventType::ThinkingTextMessageEnd => EventKind::ThinkingTextMessageEnd,
            EventType::ToolCallStart => EventKind::ToolCallStart(ToolCallStartEvent {
                tool_call_id: string(doc, TOOL_CALL_ID),
                tool_call_name: string(doc, TOOL_CALL_NAME),
                parent_message_id: opt_string(doc, PARENT_MESSAGE_ID).filter(|id| !id.is_empty()),
            }),
            EventType::ToolCallArgs => EventKind::ToolCallArgs(ToolCallArgsEvent {
                tool_call_id: string(doc, TOOL_CALL_ID),
                delta: string(doc, DELTA),
            }),
            EventType::ToolCallEnd => EventKind::ToolCallEnd(ToolCallEndEvent {
                tool_call_id: string(doc, TOOL_CALL_ID),
            }),
            EventType::ToolCallChunk => EventKind::ToolCallChunk(ToolCallChunkEvent {
                tool_call_id: string(doc, TOOL_CALL_ID),
                tool_call_name: opt_string(doc, TOOL_CALL_NAME),
                parent_message_id: opt_string(doc, PARENT_MESSAGE_ID).filter(|id| !id.is_empty()),
                delta: string(doc, &["delta", "arguments"]),
            }),
            EventType::ToolCallResult => EventKind::ToolCallResult(ToolCallResultEvent {
                message_id: opt_string(doc, MESSAGE_ID).filter(|id| !id.is_empty()),
                tool_call_id: string(doc, TOOL_CALL_ID),
                result: string(doc, TOOL_RESULT),
            }),
            EventType::ThinkingStart => EventKind::ThinkingStart(ThinkingStartEvent {
                title: opt_string(doc, &["title"]),
            }),
            EventType::ThinkingEnd => EventKind::ThinkingEnd,
            EventType::StateSnapshot => EventKind::StateSnapshot(StateSnapshotEvent {
                snapshot: value(doc, &["snapshot"]),
            }),
            EventType::StateDelta => EventKind::StateDelta(StateDeltaEvent {
                delta: value(doc, PATCH),
            }),
            EventType::MessagesSnapshot => EventKind::MessagesSnapshot(MessagesSnapshotEvent {
                messages: array(doc, &["messages"])
                    .iter()
                    .map(Message::from_value)
                    .collect(),
            }),
            EventType::RunStarted => EventKind::RunStarted(RunStartedEvent {
                thread_id: string(doc, THREAD_ID),
                run_id: string(doc, RUN_ID),
            }),
            EventType::RunFinished => EventKind::RunFinished(RunFinishedEvent {
                thread_id: string(doc, THREAD_ID),
                run_id: string(doc, RUN_ID),
                result: value(doc, &["result"]),
            }),
            EventType::RunError => EventKind::RunError(RunErrorEvent {
                message: string(doc, ERROR_MESSAGE),
                code: opt_string(doc, &["code"]),
            }),
            EventType::StepStarted => EventKind::StepStarted(StepStartedEvent {
                step_id: string(doc, STEP_ID),
            }),
            EventType::StepFinished => EventKind::StepFinished(StepFinishedEvent {
                step_id: string(doc, STEP_ID),
            }),
            EventType::Raw => {
                let data = match doc.get("data") {
                    Some(Value::String(data)) => data.clone(),
                    _ => doc.get("event").map(Value::to_string).unwrap_or_default(),
                };
                EventKind::Raw(RawEvent {
                    data,
                    source: opt_string(doc, &["source"]),
                })
            }
            EventType::Custom => EventKind::Custom(CustomEvent {
                event_type: string(doc, CUSTOM_TYPE),
                data: value(doc, CUSTOM_DATA),
            }),
        }
    }

    /// Kind-specific wire fields, without `type` and `timestamp`.
    fn encode_fields(&self) -> Map<String, Value> {
        let value = match self {
            EventKind::TextMessageStart(e) => json!({
                "messageId": e.message_id,
                "role": e.role.as_str(),
            }),
            EventKind::TextMessageContent(e) => json!({
                "messageId": e.message_id,
                "delta": e.delta,
            }),
            EventKind::TextMessageEnd(e) => json!({ "messageId": e.message_id }),
            EventKind::TextMessageChunk(e) => {
                let mut v = json!({ "messageId": e.message_id, "delta": e.delta });
                if let Some(role) = e.role {
                    v["role"] = json!(role.as_str());
                }
                v
            }
            EventKind::ThinkingTextMessageStart
            | EventKind::ThinkingTextMessageEnd
            | EventKind::ThinkingEnd => json!({}),
            EventKind::ThinkingTextMessageContent(e) => json!({ "delta": e.delta }),
            EventKind::ToolCallStart(e) => {
                let mut v = json!({
                    "toolCallId": e.tool_call_id,
                    "toolCallName": e.tool_call_name,
                });
                if let Some(parent) = &e.parent_message_id {
                    v["parentMessageId"] = json!(parent);
                }
                v
            }
            EventKind::ToolCallArgs(e) => json!({
                "toolCallId": e.tool_call_id,
                "delta": e.delta,
            }),
            EventKind::ToolCallEnd(e) => json!({ "toolCallId": e.tool_call_id }),
            EventKind::ToolCallChunk(e) => {
                let mut v = json!({ "toolCallId": e.tool_call_id, "delta": e.delta });
                if let Some(name) = &e.tool_call_name {
                    v["toolCallName"] = json!(name);
                }
                if let Some(parent) = &e.parent_message_id {
                    v["parentMessageId"] = json!(parent);
                }
                v
            }
            EventKind::ToolCallResult(e) => {
                let mut v = json!({ "toolCallId": e.tool_call_id, "result": e.result });
                if let Some(id) = &e.message_id {
                    v["messageId"] = json!(id);
                }
                v
            }
            EventKind::ThinkingStart(e) => match &e.title {
                Some(title) => json!({ "title": title }),
                None => json!({}),
            },
            EventKind::StateSnapshot(e) => json!({ "snapshot": e.snapshot }),
            EventKind::StateDelta(e) => json!({ "delta": e.delta }),
            EventKind::MessagesSnapshot(e) => json!({
                "messages": e.messages.iter().map(Message::to_value).collect::<Vec<_>>(),
            }),
            EventKind::RunStarted(e) => json!({
                "threadId": e.thread_id,
                "runId": e.run_id,
            }),
            EventKind::RunFinished(e) => json!({
                "threadId": e.thread_id,
                "runId": e.run_id,
                "result": e.result,
            }),
            EventKind::RunError(e) => {
                let mut v = json!({ "message": e.message });
                if let Some(code) = &e.code {
                    v["code"] = json!(code);
                }
                v
            }
            EventKind::StepStarted(e) => json!({ "stepId": e.step_id }),
            EventKind::StepFinished(e) => json!({ "stepId": e.step_id }),
            EventKind::Raw(e) => {
                let mut v = json!({ "data": e.data });
                if let Some(source) = &e.source {
                    v["source"] = json!(source);
                }
                v
            }
            EventKind::Custom(e) => json!({
                "eventType": e.event_type,
                "data": e.data,
            }),
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// A decoded protocol event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// When the event was captured (or the server's `timestamp`, if sent).
    pub timestamp: DateTime<Utc>,
    /// The document this event was decoded from.
    pub raw_event: Option<Value>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            raw_event: None,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Decode an event from a generic JSON document.
    pub fn decode(doc: &Value) -> ProtocolResult<Self> {
        if !doc.is_object() {
            return Err(ProtocolError::InvalidDocument(
                "expected a JSON object".to_string(),
            ));
        }

        let type_name = doc
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        let kind = match EventType::parse(type_name) {
            Some(event_type) => EventKind::decode_fields(event_type, doc),
            None => {
                tracing::debug!(event_type = %type_name, "Unrecognized event type, passing through as RAW");
                EventKind::Raw(RawEvent {
                    data: doc.to_string(),
                    source: None,
                })
            }
        };

        let timestamp = doc
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(Self {
            kind,
            timestamp,
            raw_event: Some(doc.clone()),
        })
    }

    /// Parse and decode one SSE payload.
    pub fn decode_str(payload: &str) -> ProtocolResult<Self> {
        let doc: Value = serde_json::from_str(payload)?;
        Self::decode(&doc)
    }

    /// Encode to the camelCase wire document.
    pub fn encode(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".to_string(), json!(self.event_type().as_str()));
        map.insert(
            "timestamp".to_string(),
            json!(self.timestamp.timestamp_millis()),
        );
        map.extend(self.kind.encode_fields());
        Value::Object(map)
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Event::new(kind)
    }
}
