//! Stream and event fixtures.
//!
//! [`SseStreamBuilder`] assembles an SSE response body the way a server
//! would emit it, and can cut it into chunks at arbitrary offsets. The
//! [`events`] module returns wire-format event documents.

use agstream_core::AgentResult;
use futures::Stream;
use serde_json::Value;

/// Builds SSE response bodies.
///
/// # Example
///
/// ```rust
/// use agstream_test_utils::{events, SseStreamBuilder};
///
/// let body = SseStreamBuilder::new()
///     .comment("keep-alive")
///     .event(events::run_started("t1", "r1"))
///     .build();
///
/// assert!(body.starts_with(": keep-alive\n"));
/// assert!(body.contains("\"type\":\"RUN_STARTED\""));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SseStreamBuilder {
    lines: Vec<String>,
    crlf: bool,
}

impl SseStreamBuilder {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Terminate lines with `\r\n` instead of `\n`.
    pub fn crlf(mut self) -> Self {
        self.crlf = true;
        self
    }

    /// Append one event as a single `data:` line.
    pub fn event(mut self, doc: Value) -> Self {
        self.lines.push(format!("data: {doc}"));
        self.lines.push(String::new());
        self
    }

    /// Append several events.
    pub fn events(self, docs: impl IntoIterator<Item = Value>) -> Self {
        docs.into_iter().fold(self, Self::event)
    }

    /// Append one event spread over several `data:` lines.
    pub fn multiline_event(mut self, parts: &[&str]) -> Self {
        self.lines
            .extend(parts.iter().map(|part| format!("data: {part}")));
        self.lines.push(String::new());
        self
    }

    /// Append a comment line.
    pub fn comment(mut self, text: &str) -> Self {
        self.lines.push(format!(": {text}"));
        self
    }

    /// Append a raw line verbatim (e.g. `event: message`, malformed data).
    pub fn raw_line(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// Render the body.
    pub fn build(&self) -> String {
        let eol = if self.crlf { "\r\n" } else { "\n" };
        self.lines
            .iter()
            .map(|line| format!("{line}{eol}"))
            .collect()
    }

    /// Render the body as bytes.
    pub fn build_bytes(&self) -> Vec<u8> {
        self.build().into_bytes()
    }

    /// Render the body and cut it into chunks of at most `size` bytes.
    ///
    /// Cuts ignore line and UTF-8 boundaries.
    pub fn chunks(&self, size: usize) -> Vec<Vec<u8>> {
        self.build_bytes()
            .chunks(size.max(1))
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Render the body as a chunk stream, as a transport would deliver it.
    pub fn chunk_stream(&self, size: usize) -> impl Stream<Item = AgentResult<Vec<u8>>> {
        futures::stream::iter(self.chunks(size).into_iter().map(Ok))
    }
}

/// Wire-format event documents (camelCase fields).
pub mod events {
    use serde_json::{json, Value};

    pub fn text_message_start(message_id: &str) -> Value {
        json!({"type": "TEXT_MESSAGE_START", "messageId": message_id, "role": "assistant"})
    }

    pub fn text_message_content(message_id: &str, delta: &str) -> Value {
        json!({"type": "TEXT_MESSAGE_CONTENT", "messageId": message_id, "delta": delta})
    }

    pub fn text_message_end(message_id: &str) -> Value {
        json!({"type": "TEXT_MESSAGE_END", "messageId": message_id})
    }

    pub fn text_message_chunk(message_id: &str, delta: &str) -> Value {
        json!({"type": "TEXT_MESSAGE_CHUNK", "messageId": message_id, "delta": delta})
    }

    /// A complete Start, Content..., End sequence.
    pub fn text_message(message_id: &str, deltas: &[&str]) -> Vec<Value> {
        let mut docs = vec![text_message_start(message_id)];
        docs.extend(deltas.iter().map(|d| text_message_content(message_id, d)));
        docs.push(text_message_end(message_id));
        docs
    }

    pub fn thinking_text_message_start() -> Value {
        json!({"type": "THINKING_TEXT_MESSAGE_START"})
    }

    pub fn thinking_text_message_content(delta: &str) -> Value {
        json!({"type": "THINKING_TEXT_MESSAGE_CONTENT", "delta": delta})
    }

    pub fn thinking_text_message_end() -> Value {
        json!({"type": "THINKING_TEXT_MESSAGE_END"})
    }

    pub fn tool_call_start(tool_call_id: &str, name: &str, parent: Option<&str>) -> Value {
        let mut doc = json!({
            "type": "TOOL_CALL_START",
            "toolCallId": tool_call_id,
            "toolCallName": name,
        });
        if let Some(parent) = parent {
            doc["parentMessageId"] = json!(parent);
        }
        doc
    }

    pub fn tool_call_args(tool_call_id: &str, delta: &str) -> Value {
        json!({"type": "TOOL_CALL_ARGS", "toolCallId": tool_call_id, "delta": delta})
    }

    pub fn tool_call_end(tool_call_id: &str) -> Value {
        json!({"type": "TOOL_CALL_END", "toolCallId": tool_call_id})
    }

    /// A complete Start, Args..., End sequence.
    pub fn tool_call(tool_call_id: &str, name: &str, parent: Option<&str>, args: &[&str]) -> Vec<Value> {
        let mut docs = vec![tool_call_start(tool_call_id, name, parent)];
        docs.extend(args.iter().map(|a| tool_call_args(tool_call_id, a)));
        docs.push(tool_call_end(tool_call_id));
        docs
    }

    pub fn tool_call_result(message_id: &str, tool_call_id: &str, content: &str) -> Value {
        json!({
            "type": "TOOL_CALL_RESULT",
            "messageId": message_id,
            "toolCallId": tool_call_id,
            "content": content,
        })
    }

    pub fn state_snapshot(snapshot: Value) -> Value {
        json!({"type": "STATE_SNAPSHOT", "snapshot": snapshot})
    }

    pub fn state_delta(patch: Value) -> Value {
        json!({"type": "STATE_DELTA", "delta": patch})
    }

    pub fn messages_snapshot(messages: Value) -> Value {
        json!({"type": "MESSAGES_SNAPSHOT", "messages": messages})
    }

    pub fn run_started(thread_id: &str, run_id: &str) -> Value {
        json!({"type": "RUN_STARTED", "threadId": thread_id, "runId": run_id})
    }

    pub fn run_finished(thread_id: &str, run_id: &str, result: Value) -> Value {
        json!({"type": "RUN_FINISHED", "threadId": thread_id, "runId": run_id, "result": result})
    }

    pub fn run_error(message: &str) -> Value {
        json!({"type": "RUN_ERROR", "message": message})
    }

    pub fn step_started(step_id: &str) -> Value {
        json!({"type": "STEP_STARTED", "stepId": step_id})
    }

    pub fn step_finished(step_id: &str) -> Value {
        json!({"type": "STEP_FINISHED", "stepId": step_id})
    }

    pub fn custom(event_type: &str, data: Value) -> Value {
        json!({"type": "CUSTOM", "eventType": event_type, "data": data})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_lf_and_crlf() {
        let builder = SseStreamBuilder::new().event(json!({"type": "X"}));
        assert_eq!(builder.build(), "data: {\"type\":\"X\"}\n\n");
        assert_eq!(
            builder.clone().crlf().build(),
            "data: {\"type\":\"X\"}\r\n\r\n"
        );
    }

    #[test]
    fn test_chunks_cover_body() {
        let builder = SseStreamBuilder::new().events(events::text_message("m1", &["a", "b"]));
        let chunks = builder.chunks(7);
        assert!(chunks.iter().all(|c| c.len() <= 7));
        assert_eq!(chunks.concat(), builder.build_bytes());
        assert_eq!(builder.chunks(0).len(), builder.build_bytes().len());
    }

    #[test]
    fn test_multiline_event() {
        let body = SseStreamBuilder::new()
            .multiline_event(&["{\"type\":", "\"RUN_ERROR\"}"])
            .build();
        assert_eq!(body, "data: {\"type\":\ndata: \"RUN_ERROR\"}\n\n");
    }
}
