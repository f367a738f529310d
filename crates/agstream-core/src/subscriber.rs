//! Subscriber hooks and state mutations.
//!
//! A [`Subscriber`] observes every event the reducer handles. Event hooks
//! return a [`Mutation`] asking the reducer to replace the message list or
//! the state document, or to stop further processing of the event.
//! Lifecycle notifications (`on_new_message`, `on_state_changed`, ...) are
//! fire-and-forget.
//!
//! Every method has a no-op default, so implementors override only what they
//! need.

use crate::error::{AgentError, AgentResult};
use agstream_protocol::{
    CustomEvent, Event, Message, MessagesSnapshotEvent, RawEvent, RunAgentInput, RunAgentResult,
    RunErrorEvent, RunFinishedEvent, RunStartedEvent, StateDeltaEvent, StateSnapshotEvent,
    StepFinishedEvent, StepStartedEvent, TextMessageChunkEvent, TextMessageContentEvent,
    TextMessageEndEvent, TextMessageStartEvent, ThinkingStartEvent,
    ThinkingTextMessageContentEvent, ToolCall, ToolCallArgsEvent, ToolCallChunkEvent,
    ToolCallEndEvent, ToolCallResultEvent, ToolCallStartEvent,
};
use serde_json::Value;

/// Requested changes to the session, returned by subscriber hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    /// Replacement message list.
    pub messages: Option<Vec<Message>>,
    /// Replacement state document.
    pub state: Option<Value>,
    /// Skip everything after the hook that set this.
    pub stop_propagation: bool,
}

impl Mutation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn stop(mut self) -> Self {
        self.stop_propagation = true;
        self
    }

    pub fn has_changes(&self) -> bool {
        self.messages.is_some() || self.state.is_some()
    }

    /// Combine with a later mutation: set fields of `other` win, stop is sticky.
    pub fn merge(&mut self, other: Mutation) {
        if other.messages.is_some() {
            self.messages = other.messages;
        }
        if other.state.is_some() {
            self.state = other.state;
        }
        self.stop_propagation |= other.stop_propagation;
    }
}

/// Read-only view of the session handed to every hook.
#[derive(Debug, Clone, Copy)]
pub struct SubscriberParams<'a> {
    pub messages: &'a [Message],
    pub state: &'a Value,
    /// Request of the active run, if any.
    pub input: Option<&'a RunAgentInput>,
}

/// Result of an event hook. An error aborts handling of the current event.
pub type HookResult = AgentResult<Mutation>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

/// Observer of session events.
pub trait Subscriber: Send + Sync {
    /// Called first for every event, before default handling.
    fn on_event(&self, _event: &Event, _params: &SubscriberParams<'_>) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_text_message_start(
        &self,
        _event: &TextMessageStartEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    /// `buffer` holds the text accumulated so far, including this delta.
    fn on_text_message_content(
        &self,
        _event: &TextMessageContentEvent,
        _buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    /// `buffer` holds the complete streamed text of the closed message.
    fn on_text_message_end(
        &self,
        _event: &TextMessageEndEvent,
        _buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_text_message_chunk(
        &self,
        _event: &TextMessageChunkEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_thinking_text_message_start(&self, _params: &SubscriberParams<'_>) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_thinking_text_message_content(
        &self,
        _event: &ThinkingTextMessageContentEvent,
        _buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_thinking_text_message_end(
        &self,
        _buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_tool_call_start(
        &self,
        _event: &ToolCallStartEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    /// `buffer` holds the arguments accumulated so far, including this delta.
    fn on_tool_call_args(
        &self,
        _event: &ToolCallArgsEvent,
        _buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_tool_call_end(
        &self,
        _event: &ToolCallEndEvent,
        _buffer: &str,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_tool_call_chunk(
        &self,
        _event: &ToolCallChunkEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_tool_call_result(
        &self,
        _event: &ToolCallResultEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_thinking_start(
        &self,
        _event: &ThinkingStartEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_thinking_end(&self, _params: &SubscriberParams<'_>) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_state_snapshot(
        &self,
        _event: &StateSnapshotEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_state_delta(
        &self,
        _event: &StateDeltaEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_messages_snapshot(
        &self,
        _event: &MessagesSnapshotEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_run_started(
        &self,
        _event: &RunStartedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_run_finished(
        &self,
        _event: &RunFinishedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_run_error(&self, _event: &RunErrorEvent, _params: &SubscriberParams<'_>) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_step_started(
        &self,
        _event: &StepStartedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_step_finished(
        &self,
        _event: &StepFinishedEvent,
        _params: &SubscriberParams<'_>,
    ) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_raw_event(&self, _event: &RawEvent, _params: &SubscriberParams<'_>) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_custom_event(&self, _event: &CustomEvent, _params: &SubscriberParams<'_>) -> HookResult {
        Ok(Mutation::none())
    }

    fn on_new_message(&self, _message: &Message) {}

    fn on_new_tool_call(&self, _tool_call: &ToolCall) {}

    fn on_messages_changed(&self, _messages: &[Message]) {}

    fn on_state_changed(&self, _state: &Value) {}

    fn on_run_initialized(&self, _input: &RunAgentInput) {}

    fn on_run_failed(&self, _error: &AgentError) {}

    fn on_run_finalized(&self, _result: &RunAgentResult) {}
}
