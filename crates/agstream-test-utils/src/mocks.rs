//! Mock implementations for testing.
//!
//! Provides recording test doubles for the subscriber and middleware seams
//! and a scripted transport.

use agstream_core::{
    AgentError, AgentResult, ByteStream, HookResult, Middleware, MiddlewareContext, Mutation,
    Subscriber, SubscriberParams, Transport, TransportRequest,
};
use agstream_protocol::{
    CustomEvent, Event, EventType, Message, MessagesSnapshotEvent, RawEvent, RunAgentInput,
    RunAgentResult, RunErrorEvent, RunFinishedEvent, RunStartedEvent, StateDeltaEvent,
    StateSnapshotEvent, StepFinishedEvent, StepStartedEvent, TextMessageChunkEvent,
    TextMessageContentEvent, TextMessageEndEvent, TextMessageStartEvent, ThinkingStartEvent,
    ThinkingTextMessageContentEvent, ToolCall, ToolCallArgsEvent, ToolCallChunkEvent,
    ToolCallEndEvent, ToolCallResultEvent, ToolCallStartEvent,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A recorded subscriber hook invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCall {
    /// Hook method name, e.g. `on_text_message_end`.
    pub hook: &'static str,
    /// Event type for event hooks.
    pub event_type: Option<EventType>,
    /// Buffer contents for hooks that receive one.
    pub buffer: Option<String>,
}

/// A subscriber that records every hook call.
///
/// Kind-specific hooks return the canned mutation configured for their event
/// type; `on_event` can be told to stop propagation or fail.
///
/// # Example
///
/// ```rust
/// use agstream_core::Mutation;
/// use agstream_protocol::EventType;
/// use agstream_test_utils::mocks::RecordingSubscriber;
/// use serde_json::json;
///
/// let subscriber = RecordingSubscriber::new()
///     .with_mutation(EventType::StepStarted, Mutation::none().with_state(json!({"step": 1})))
///     .stop_on(EventType::Custom);
///
/// assert!(subscriber.calls().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct RecordingSubscriber {
    calls: Arc<Mutex<Vec<HookCall>>>,
    mutations: Arc<Mutex<HashMap<EventType, Mutation>>>,
    stop_on: Arc<Mutex<HashSet<EventType>>>,
    fail_on: Arc<Mutex<HashSet<EventType>>>,
}

impl RecordingSubscriber {
    /// Create a subscriber that only records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `mutation` from the kind-specific hook of `event_type`.
    pub fn with_mutation(self, event_type: EventType, mutation: Mutation) -> Self {
        self.mutations.lock().unwrap().insert(event_type, mutation);
        self
    }

    /// Stop propagation from `on_event` for `event_type`.
    pub fn stop_on(self, event_type: EventType) -> Self {
        self.stop_on.lock().unwrap().insert(event_type);
        self
    }

    /// Fail `on_event` with an execution error for `event_type`.
    pub fn fail_on(self, event_type: EventType) -> Self {
        self.fail_on.lock().unwrap().insert(event_type);
        self
    }

    /// All recorded calls, oldest first.
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of all recorded hooks, oldest first.
    pub fn hook_names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|c| c.hook).collect()
    }

    /// Whether `hook` was called at least once.
    pub fn was_called(&self, hook: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.hook == hook)
    }

    /// Number of calls to `hook`.
    pub fn call_count(&self, hook: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.hook == hook)
            .count()
    }

    /// Buffers passed to `hook`, oldest first.
    pub fn buffers(&self, hook: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.hook == hook)
            .filter_map(|c| c.buffer.clone())
            .collect()
    }

    /// Forget all recorded calls.
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, hook: &'static str, event_type: Option<EventType>, buffer: Option<&str>) {
        self.calls.lock().unwrap().push(HookCall {
            hook,
            event_type,
            buffer: buffer.map(str::to_string),
        });
    }

    fn hook(&self, hook: &'static str, event_type: EventType, buffer: Option<&str>) -> HookResult {
        self.record(hook, Some(event_type), buffer);
        Ok(self
            .mutations
            .lock()
            .unwrap()
            .get(&event_type)
            .cloned()
            .unwrap_or_default())
    }
}

impl Subscriber for RecordingSubscriber {
    fn on_event(&self, event: &Event, _params: &SubscriberParams<'_>) -> HookResult {
        let event_type = event.event_type();
        self.record("on_event", Some(event_type), None);
        if self.fail_on.lock().unwrap().contains(&event_type) {
            return Err(AgentError::execution(format!("subscriber failed on {event_type}")));
        }
        if self.stop_on.lock().unwrap().contains(&event_type) {
            return Ok(Mutation::none().stop());
        }
        Ok(Mutation::none())
    }

    fn on_text_message_start(
        &self,
        _event: &TextMessageStartEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_text_message_start", EventType::TextMessageStart, None)
    }

    fn on_text_message_content(
        &self,
        _event: &TextMessageContentEvent,
        buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_text_message_content", EventType::TextMessageContent, Some(buffer))
    }

    fn on_text_message_end(
        &self,
        _event: &TextMessageEndEvent,
        buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_text_message_end", EventType::TextMessageEnd, Some(buffer))
    }

    fn on_text_message_chunk(
        &self,
        _event: &TextMessageChunkEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_text_message_chunk", EventType::TextMessageChunk, None)
    }

    fn on_thinking_text_message_start(&self, _params: &SubscriberParams<'_>) -> HookResult {
        self.hook(
            "on_thinking_text_message_start",
            EventType::ThinkingTextMessageStart,
            None,
        )
    }

    fn on_thinking_text_message_content(
        &self,
        _event: &ThinkingTextMessageContentEvent,
        buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook(
            "on_thinking_text_message_content",
            EventType::ThinkingTextMessageContent,
            Some(buffer),
        )
    }

    fn on_thinking_text_message_end(
        &self,
        buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook(
            "on_thinking_text_message_end",
            EventType::ThinkingTextMessageEnd,
            Some(buffer),
        )
    }

    fn on_tool_call_start(
        &self,
        _event: &ToolCallStartEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_tool_call_start", EventType::ToolCallStart, None)
    }

    fn on_tool_call_args(
        &self,
        _event: &ToolCallArgsEvent,
        buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_tool_call_args", EventType::ToolCallArgs, Some(buffer))
    }

    fn on_tool_call_end(
        &self,
        _event: &ToolCallEndEvent,
        buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_tool_call_end", EventType::ToolCallEnd, Some(buffer))
    }

    fn on_tool_call_chunk(
        &self,
        _event: &ToolCallChunkEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_tool_call_chunk", EventType::ToolCallChunk, None)
    }

    fn on_tool_call_result(
        &self,
        _event: &ToolCallResultEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_tool_call_result", EventType::ToolCallResult, None)
    }

    fn on_thinking_start(
        &self,
        _event: &ThinkingStartEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_thinking_start", EventType::ThinkingStart, None)
    }

    fn on_thinking_end(&self, _params: &SubscriberParams<'_>) -> HookResult {
        self.hook("on_thinking_end", EventType::ThinkingEnd, None)
    }

    fn on_state_snapshot(
        &self,
        _event: &StateSnapshotEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_state_snapshot", EventType::StateSnapshot, None)
    }

    fn on_state_delta(
        &self,
        _event: &StateDeltaEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_state_delta", EventType::StateDelta, None)
    }

    fn on_messages_snapshot(
        &self,
        _event: &MessagesSnapshotEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_messages_snapshot", EventType::MessagesSnapshot, None)
    }

    fn on_run_started(
        &self,
        _event: &RunStartedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_run_started", EventType::RunStarted, None)
    }

    fn on_run_finished(
        &self,
        _event: &RunFinishedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_run_finished", EventType::RunFinished, None)
    }

    fn on_run_error(&self, _event: &RunErrorEvent, _params: &SubscriberParams<'_>) -> HookResult {
        self.hook("on_run_error", EventType::RunError, None)
    }

    fn on_step_started(
        &self,
        _event: &StepStartedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_step_started", EventType::StepStarted, None)
    }

    fn on_step_finished(
        &self,
        _event: &StepFinishedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        self.hook("on_step_finished", EventType::StepFinished, None)
    }

    fn on_raw_event(&self, _event: &RawEvent, _params: &SubscriberParams<'_>) -> HookResult {
        self.hook("on_raw_event", EventType::Raw, None)
    }

    fn on_custom_event(&self, _event: &CustomEvent, _params: &SubscriberParams<'_>) -> HookResult {
        self.hook("on_custom_event", EventType::Custom, None)
    }

    fn on_new_message(&self, _message: &Message) {
        self.record("on_new_message", None, None);
    }

    fn on_new_tool_call(&self, _tool_call: &ToolCall) {
        self.record("on_new_tool_call", None, None);
    }

    fn on_messages_changed(&self, _messages: &[Message]) {
        self.record("on_messages_changed", None, None);
    }

    fn on_state_changed(&self, _state: &Value) {
        self.record("on_state_changed", None, None);
    }

    fn on_run_initialized(&self, _input: &RunAgentInput) {
        self.record("on_run_initialized", None, None);
    }

    fn on_run_failed(&self, _error: &AgentError) {
        self.record("on_run_failed", None, None);
    }

    fn on_run_finalized(&self, _result: &RunAgentResult) {
        self.record("on_run_finalized", None, None);
    }
}

/// A middleware stage that records each phase into a log.
///
/// Several stages can share one log to check ordering across the chain.
/// Entries look like `name:request`, `name:event:TEXT_MESSAGE_START`,
/// `name:response` and `name:error`.
#[derive(Clone)]
pub struct RecordingMiddleware {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    halt: bool,
    suppress_errors: bool,
}

impl RecordingMiddleware {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Arc::new(Mutex::new(Vec::new())),
            halt: false,
            suppress_errors: false,
        }
    }

    /// Record into a shared log.
    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    /// Refuse to continue the request phase.
    pub fn halting(mut self) -> Self {
        self.halt = true;
        self
    }

    /// Suppress every error.
    pub fn suppressing_errors(mut self) -> Self {
        self.suppress_errors = true;
        self
    }

    /// Recorded entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(format!("{}:{entry}", self.name));
    }
}

impl Middleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_request(&self, input: RunAgentInput, _ctx: &mut MiddlewareContext<'_>) -> RunAgentInput {
        self.record("request".to_string());
        input
    }

    fn on_response(
        &self,
        result: RunAgentResult,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentResult {
        self.record("response".to_string());
        result
    }

    fn on_event(&self, event: Event, _ctx: &mut MiddlewareContext<'_>) -> Option<Event> {
        self.record(format!("event:{}", event.event_type()));
        Some(event)
    }

    fn on_error(&self, error: AgentError, _ctx: &mut MiddlewareContext<'_>) -> Option<AgentError> {
        self.record("error".to_string());
        if self.suppress_errors {
            None
        } else {
            Some(error)
        }
    }

    fn should_continue(&self, _input: &RunAgentInput, _ctx: &MiddlewareContext<'_>) -> bool {
        !self.halt
    }
}

/// One step of a scripted response.
#[derive(Debug, Clone)]
pub enum ScriptedChunk {
    Bytes(Vec<u8>),
    /// Fail the stream with a network error.
    NetworkError(String),
}

/// A transport that replays scripted chunks and records requests.
///
/// # Example
///
/// ```rust
/// use agstream_test_utils::mocks::ScriptedTransport;
///
/// let transport = ScriptedTransport::new()
///     .with_bytes(b"data: {\"type\":\"RUN_STARTED\"}\n\n".to_vec())
///     .then_hang();
///
/// assert!(transport.requests().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Vec<ScriptedChunk>,
    open_error: Option<String>,
    hang: bool,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.script.push(ScriptedChunk::Bytes(bytes.into()));
        self
    }

    pub fn with_chunks(mut self, chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        self.script.extend(chunks.into_iter().map(ScriptedChunk::Bytes));
        self
    }

    pub fn with_network_error(mut self, message: impl Into<String>) -> Self {
        self.script.push(ScriptedChunk::NetworkError(message.into()));
        self
    }

    /// Fail `open` itself with a network error.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Never end the stream after the script runs out.
    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Requests received by `open`, oldest first.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: TransportRequest) -> AgentResult<ByteStream> {
        self.requests.lock().unwrap().push(request);
        if let Some(message) = &self.open_error {
            return Err(AgentError::network(message.clone()));
        }

        let items = self.script.clone().into_iter().map(|chunk| match chunk {
            ScriptedChunk::Bytes(bytes) => Ok(bytes),
            ScriptedChunk::NetworkError(message) => Err(AgentError::network(message)),
        });
        let stream = futures::stream::iter(items);
        if self.hang {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}
