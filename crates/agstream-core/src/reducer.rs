//! Session state reducer.
//!
//! [`SessionReducer`] owns the message list, the state document and the
//! partial-delta buffers of one session. Events are applied one at a time:
//!
//! 1. every subscriber's `on_event` hook runs; a stop request ends handling;
//! 2. the reducer's own handling for the event kind commits its effects;
//! 3. the kind-specific hooks run and their combined [`Mutation`] is returned.
//!
//! Callers then commit that mutation with [`SessionReducer::apply_mutation`].

use crate::error::{AgentError, AgentResult};
use crate::id::{IdGenerator, UlidGenerator};
use crate::patch::StateStore;
use crate::subscriber::{HookResult, Mutation, Subscriber, SubscriberId, SubscriberParams};
use agstream_protocol::{
    Event, EventKind, Message, Role, RunAgentInput, RunAgentResult, ToolCall,
    ToolCallChunkEvent, ToolCallStartEvent,
};
use agstream_util::IdPrefix;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SessionReducer {
    messages: Vec<Message>,
    state: StateStore,
    /// Last non-null `RUN_FINISHED` result.
    result: Option<Value>,
    input: Option<RunAgentInput>,
    subscribers: Vec<(SubscriberId, Arc<dyn Subscriber>)>,
    next_subscriber_id: u64,
    /// Open text and thinking buffers, by message id.
    text_buffers: HashMap<String, String>,
    /// Open argument buffers, by tool call id.
    tool_args_buffers: HashMap<String, String>,
    /// Owning message of each open tool call.
    tool_call_parents: HashMap<String, String>,
    /// Id synthesized by the open thinking message, if any.
    open_thinking: Option<String>,
    ids: Arc<dyn IdGenerator>,
}

impl Default for SessionReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionReducer {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            state: StateStore::default(),
            result: None,
            input: None,
            subscribers: Vec::new(),
            next_subscriber_id: 0,
            text_buffers: HashMap::new(),
            tool_args_buffers: HashMap::new(),
            tool_call_parents: HashMap::new(),
            open_thinking: None,
            ids: Arc::new(UlidGenerator),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_state_store(mut self, state: StateStore) -> Self {
        self.state = state;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> &Value {
        self.state.state()
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    pub fn state_store_mut(&mut self) -> &mut StateStore {
        &mut self.state
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn input(&self) -> Option<&RunAgentInput> {
        self.input.as_ref()
    }

    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Append a message, notifying subscribers.
    pub fn add_message(&mut self, message: Message) {
        self.push_message(message);
    }

    pub fn set_state(&mut self, state: Value) {
        self.state.set_state(state);
    }

    pub fn find_message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Locate a tool call and the message that owns it.
    pub fn find_tool_call(&self, tool_call_id: &str) -> Option<(&Message, &ToolCall)> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.find_tool_call(tool_call_id).map(|tc| (m, tc)))
    }

    pub fn text_buffer(&self, message_id: &str) -> Option<&str> {
        self.text_buffers.get(message_id).map(String::as_str)
    }

    pub fn tool_args_buffer(&self, tool_call_id: &str) -> Option<&str> {
        self.tool_args_buffers.get(tool_call_id).map(String::as_str)
    }

    pub fn has_open_buffers(&self) -> bool {
        !self.text_buffers.is_empty() || !self.tool_args_buffers.is_empty()
    }

    /// Drop every open buffer, e.g. after an interrupted stream.
    pub fn clear_buffers(&mut self) {
        self.text_buffers.clear();
        self.tool_args_buffers.clear();
        self.tool_call_parents.clear();
        self.open_thinking = None;
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.next_subscriber_id += 1;
        let id = SubscriberId(self.next_subscriber_id);
        self.subscribers.push((id, subscriber));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Prepare for a new run: buffers and the previous result are dropped.
    pub fn begin_run(&mut self, input: RunAgentInput) {
        self.clear_buffers();
        self.result = None;
        self.notify(|s| s.on_run_initialized(&input));
        self.input = Some(input);
    }

    pub fn notify_run_failed(&self, error: &AgentError) {
        self.notify(|s| s.on_run_failed(error));
    }

    pub fn notify_run_finalized(&self, result: &RunAgentResult) {
        self.notify(|s| s.on_run_finalized(result));
    }

    /// Process one event. See the module docs for the hook order.
    ///
    /// An error aborts this event only; effects of earlier events stay.
    pub fn handle_event(&mut self, event: &Event) -> AgentResult<Mutation> {
        let generic = self.run_hooks(|s, p| s.on_event(event, p))?;
        if generic.stop_propagation {
            debug!(event_type = %event.event_type(), "Event propagation stopped by subscriber");
            return Ok(generic);
        }

        let buffer = self.apply_default(event)?.unwrap_or_default();

        self.run_hooks(|s, p| dispatch(s, event, &buffer, p))
    }

    /// Commit a mutation, then notify about what changed.
    pub fn apply_mutation(&mut self, mutation: Mutation) {
        let Mutation {
            messages, state, ..
        } = mutation;

        let messages_changed = messages.is_some();
        if let Some(messages) = messages {
            self.messages = messages;
        }
        let state_changed = state.is_some();
        if let Some(state) = state {
            self.state.set_state(state);
        }

        if messages_changed {
            self.notify_messages_changed();
        }
        if state_changed {
            self.notify_state_changed();
        }
    }

    fn params(&self) -> SubscriberParams<'_> {
        SubscriberParams {
            messages: &self.messages,
            state: self.state.state(),
            input: self.input.as_ref(),
        }
    }

    /// Run a hook on every subscriber in order, stopping at the first stop
    /// request.
    fn run_hooks<F>(&self, mut hook: F) -> AgentResult<Mutation>
    where
        F: FnMut(&dyn Subscriber, &SubscriberParams<'_>) -> HookResult,
    {
        let params = self.params();
        let mut combined = Mutation::none();
        for (_, subscriber) in &self.subscribers {
            combined.merge(hook(subscriber.as_ref(), &params)?);
            if combined.stop_propagation {
                break;
            }
        }
        Ok(combined)
    }

    fn notify(&self, f: impl Fn(&dyn Subscriber)) {
        for (_, subscriber) in &self.subscribers {
            f(subscriber.as_ref());
        }
    }

    fn notify_messages_changed(&self) {
        self.notify(|s| s.on_messages_changed(&self.messages));
    }

    fn notify_state_changed(&self) {
        self.notify(|s| s.on_state_changed(self.state.state()));
    }

    fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        if let Some(message) = self.messages.last() {
            self.notify(|s| s.on_new_message(message));
        }
    }

    fn find_message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn tool_call_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolCall> {
        match self.tool_call_parents.get(tool_call_id) {
            Some(parent_id) => self
                .messages
                .iter_mut()
                .find(|m| &m.id == parent_id)
                .and_then(|m| m.find_tool_call_mut(tool_call_id)),
            None => self
                .messages
                .iter_mut()
                .rev()
                .find_map(|m| m.find_tool_call_mut(tool_call_id)),
        }
    }

    /// Id of the message a new tool call attaches to, creating it if needed.
    fn resolve_parent(&mut self, requested: Option<&str>) -> String {
        match requested {
            Some(id) => {
                if self.find_message(id).is_none() {
                    self.push_message(Message::new(id, Role::Assistant, ""));
                }
                id.to_string()
            }
            None => match self.messages.last() {
                Some(last) if last.role == Role::Assistant => last.id.clone(),
                _ => {
                    let id = self.ids.next_id(IdPrefix::Message);
                    self.push_message(Message::new(id.clone(), Role::Assistant, ""));
                    id
                }
            },
        }
    }

    /// Attach a new, empty tool call to its parent message.
    fn open_tool_call(
        &mut self,
        tool_call_id: &str,
        name: &str,
        parent: Option<&str>,
    ) -> AgentResult<String> {
        let parent_id = self.resolve_parent(parent);
        let message = self
            .find_message_mut(&parent_id)
            .ok_or_else(|| AgentError::state(format!("parent message {parent_id} vanished")))?;

        if message.find_tool_call(tool_call_id).is_some() {
            return Err(AgentError::validation(format!(
                "duplicate tool call {tool_call_id} in message {parent_id}"
            )));
        }

        let tool_call = ToolCall::new(tool_call_id, name);
        message.tool_calls.push(tool_call.clone());
        self.notify(|s| s.on_new_tool_call(&tool_call));
        Ok(parent_id)
    }

    /// Default handling. Returns the buffer contents hooks should see.
    fn apply_default(&mut self, event: &Event) -> AgentResult<Option<String>> {
        match &event.kind {
            EventKind::TextMessageStart(e) => {
                if self.find_message(&e.message_id).is_some() {
                    warn!(message_id = %e.message_id, "Text message started twice");
                } else {
                    if e.role != Role::Assistant {
                        debug!(message_id = %e.message_id, role = %e.role, "Text message role overridden to assistant");
                    }
                    self.push_message(Message::new(e.message_id.clone(), Role::Assistant, ""));
                }
                self.text_buffers.insert(e.message_id.clone(), String::new());
                Ok(None)
            }
            EventKind::TextMessageContent(e) => {
                let buffer = append_to_buffer(&mut self.text_buffers, &e.message_id, &e.delta);
                match self.find_message_mut(&e.message_id) {
                    Some(message) => message.content.push_str(&e.delta),
                    None => warn!(message_id = %e.message_id, "Content for unknown message"),
                }
                Ok(buffer)
            }
            EventKind::TextMessageEnd(e) => {
                let buffer = self.text_buffers.remove(&e.message_id);
                if buffer.is_none() {
                    debug!(message_id = %e.message_id, "No open text buffer to close");
                }
                self.notify_messages_changed();
                Ok(buffer)
            }
            EventKind::TextMessageChunk(e) => {
                let id = if e.message_id.is_empty() {
                    match self.messages.last() {
                        Some(last) if last.role == Role::Assistant => last.id.clone(),
                        _ => self.ids.next_id(IdPrefix::Message),
                    }
                } else {
                    e.message_id.clone()
                };

                match self.find_message_mut(&id) {
                    Some(message) => message.content.push_str(&e.delta),
                    None => self.push_message(Message::new(
                        id,
                        e.role.unwrap_or(Role::Assistant),
                        e.delta.clone(),
                    )),
                }
                self.notify_messages_changed();
                Ok(None)
            }
            EventKind::ThinkingTextMessageStart => {
                let id = self.ids.next_id(IdPrefix::Thinking);
                if let Some(previous) = self.open_thinking.replace(id.clone()) {
                    debug!(message_id = %previous, "Thinking message restarted before its end");
                    self.text_buffers.remove(&previous);
                }
                self.text_buffers.insert(id.clone(), String::new());
                self.push_message(Message::new(id, Role::Assistant, ""));
                Ok(None)
            }
            EventKind::ThinkingTextMessageContent(e) => {
                let Some(last) = self.messages.last_mut() else {
                    warn!("Thinking content with no message to accrue onto");
                    return Ok(None);
                };
                last.content.push_str(&e.delta);
                Ok(self
                    .open_thinking
                    .as_deref()
                    .and_then(|id| append_to_buffer(&mut self.text_buffers, id, &e.delta)))
            }
            EventKind::ThinkingTextMessageEnd => {
                let buffer = self
                    .open_thinking
                    .take()
                    .and_then(|id| self.text_buffers.remove(&id));
                if buffer.is_none() {
                    debug!("No open thinking buffer to close");
                }
                self.notify_messages_changed();
                Ok(buffer)
            }
            EventKind::ToolCallStart(ToolCallStartEvent {
                tool_call_id,
                tool_call_name,
                parent_message_id,
            }) => {
                let parent_id =
                    self.open_tool_call(tool_call_id, tool_call_name, parent_message_id.as_deref())?;
                self.tool_args_buffers
                    .insert(tool_call_id.clone(), String::new());
                self.tool_call_parents.insert(tool_call_id.clone(), parent_id);
                Ok(None)
            }
            EventKind::ToolCallArgs(e) => {
                let buffer =
                    append_to_buffer(&mut self.tool_args_buffers, &e.tool_call_id, &e.delta);
                match self.tool_call_mut(&e.tool_call_id) {
                    Some(tool_call) => tool_call.function.arguments.push_str(&e.delta),
                    None => warn!(tool_call_id = %e.tool_call_id, "Arguments for unknown tool call"),
                }
                Ok(buffer)
            }
            EventKind::ToolCallEnd(e) => {
                let buffer = self.tool_args_buffers.remove(&e.tool_call_id);
                self.tool_call_parents.remove(&e.tool_call_id);
                self.notify_messages_changed();
                Ok(buffer)
            }
            EventKind::ToolCallChunk(ToolCallChunkEvent {
                tool_call_id,
                tool_call_name,
                parent_message_id,
                delta,
            }) => {
                if self.tool_call_mut(tool_call_id).is_none() {
                    self.open_tool_call(
                        tool_call_id,
                        tool_call_name.as_deref().unwrap_or_default(),
                        parent_message_id.as_deref(),
                    )?;
                }
                if let Some(tool_call) = self.tool_call_mut(tool_call_id) {
                    tool_call.function.arguments.push_str(delta);
                }
                self.notify_messages_changed();
                Ok(None)
            }
            EventKind::ToolCallResult(e) => {
                let id = match &e.message_id {
                    Some(id) if self.find_message(id).is_none() => id.clone(),
                    _ => self.ids.next_id(IdPrefix::ToolResult),
                };
                let mut message = Message::new(id, Role::Tool, e.result.clone());
                message.tool_call_id = Some(e.tool_call_id.clone());
                self.push_message(message);
                self.notify_messages_changed();
                Ok(None)
            }
            EventKind::StateSnapshot(e) => {
                let snapshot = if e.snapshot.is_null() {
                    warn!("State snapshot without a document; using an empty object");
                    json!({})
                } else {
                    e.snapshot.clone()
                };
                self.state.set_state(snapshot);
                self.notify_state_changed();
                Ok(None)
            }
            EventKind::StateDelta(e) => {
                self.state.apply_patch(&e.delta)?;
                self.notify_state_changed();
                Ok(None)
            }
            EventKind::MessagesSnapshot(e) => {
                self.messages = e.messages.clone();
                self.notify_messages_changed();
                Ok(None)
            }
            EventKind::RunFinished(e) => {
                if !e.result.is_null() {
                    self.result = Some(e.result.clone());
                }
                Ok(None)
            }
            EventKind::RunStarted(_)
            | EventKind::RunError(_)
            | EventKind::StepStarted(_)
            | EventKind::StepFinished(_)
            | EventKind::ThinkingStart(_)
            | EventKind::ThinkingEnd
            | EventKind::Raw(_)
            | EventKind::Custom(_) => Ok(None),
        }
    }
}

/// Append to an open buffer, returning its new contents.
fn append_to_buffer(
    buffers: &mut HashMap<String, String>,
    key: &str,
    delta: &str,
) -> Option<String> {
    let buffer = buffers.get_mut(key)?;
    buffer.push_str(delta);
    Some(buffer.clone())
}

/// Route an event to its kind-specific hook.
fn dispatch(
    subscriber: &dyn Subscriber,
    event: &Event,
    buffer: &str,
    params: &SubscriberParams<'_>,
) -> HookResult {
    match &event.kind {
        EventKind::TextMessageStart(e) => subscriber.on_text_message_start(e, params),
        EventKind::TextMessageContent(e) => subscriber.on_text_message_content(e, buffer, params),
        EventKind::TextMessageEnd(e) => subscriber.on_text_message_end(e, buffer, params),
        EventKind::TextMessageChunk(e) => subscriber.on_text_message_chunk(e, params),
        EventKind::ThinkingTextMessageStart => subscriber.on_thinking_text_message_start(params),
        EventKind::ThinkingTextMessageContent(e) => {
            subscriber.on_thinking_text_message_content(e, buffer, params)
        }
        EventKind::ThinkingTextMessageEnd => subscriber.on_thinking_text_message_end(buffer, params),
        EventKind::ToolCallStart(e) => subscriber.on_tool_call_start(e, params),
        EventKind::ToolCallArgs(e) => subscriber.on_tool_call_args(e, buffer, params),
        EventKind::ToolCallEnd(e) => subscriber.on_tool_call_end(e, buffer, params),
        EventKind::ToolCallChunk(e) => subscriber.on_tool_call_chunk(e, params),
        EventKind::ToolCallResult(e) => subscriber.on_tool_call_result(e, params),
        EventKind::ThinkingStart(e) => subscriber.on_thinking_start(e, params),
        EventKind::ThinkingEnd => subscriber.on_thinking_end(params),
        EventKind::StateSnapshot(e) => subscriber.on_state_snapshot(e, params),
        EventKind::StateDelta(e) => subscriber.on_state_delta(e, params),
        EventKind::MessagesSnapshot(e) => subscriber.on_messages_snapshot(e, params),
        EventKind::RunStarted(e) => subscriber.on_run_started(e, params),
        EventKind::RunFinished(e) => subscriber.on_run_finished(e, params),
        EventKind::RunError(e) => subscriber.on_run_error(e, params),
        EventKind::StepStarted(e) => subscriber.on_step_started(e, params),
        EventKind::StepFinished(e) => subscriber.on_step_finished(e, params),
        EventKind::Raw(e) => subscriber.on_raw_event(e, params),
        EventKind::Custom(e) => subscriber.on_custom_event(e, params),
    }
}
