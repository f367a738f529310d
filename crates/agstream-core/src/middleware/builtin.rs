//! Built-in middleware stages.

use super::{Middleware, MiddlewareContext};
use crate::error::AgentError;
use agstream_protocol::{Event, EventType, RunAgentInput, RunAgentResult};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Logs every phase through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_request(&self, input: RunAgentInput, _ctx: &mut MiddlewareContext<'_>) -> RunAgentInput {
        info!(
            thread_id = %input.thread_id,
            run_id = %input.run_id,
            messages = input.messages.len(),
            tools = input.tools.len(),
            "Run request"
        );
        input
    }

    fn on_response(
        &self,
        result: RunAgentResult,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentResult {
        info!(
            run_id = %result.run_id,
            new_messages = result.new_messages.len(),
            has_result = !result.result.is_null(),
            "Run response"
        );
        result
    }

    fn on_event(&self, event: Event, _ctx: &mut MiddlewareContext<'_>) -> Option<Event> {
        debug!(event_type = %event.event_type(), "Event");
        Some(event)
    }

    fn on_error(&self, error: AgentError, _ctx: &mut MiddlewareContext<'_>) -> Option<AgentError> {
        warn!(code = error.code().as_u32(), error = %error, "Run error");
        Some(error)
    }
}

/// Suppresses retryable errors until a run has failed `max_retries` times.
///
/// The stage only counts and annotates; scheduling the retry is up to the
/// caller, which finds `retry_attempt` and `retry_delay_ms` in the metadata.
#[derive(Debug)]
pub struct RetryMiddleware {
    max_retries: u32,
    delay_ms: u64,
    attempts: Mutex<HashMap<String, u32>>,
}

impl Default for RetryMiddleware {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

impl RetryMiddleware {
    pub fn new(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Failures counted so far for `run_id`.
    pub fn attempts(&self, run_id: &str) -> u32 {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(run_id).copied().unwrap_or(0)
    }
}

impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    fn on_response(
        &self,
        result: RunAgentResult,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentResult {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        if attempts.remove(&result.run_id).is_some() {
            debug!(run_id = %result.run_id, "Run recovered; retry count reset");
        }
        result
    }

    fn on_error(&self, error: AgentError, ctx: &mut MiddlewareContext<'_>) -> Option<AgentError> {
        if !error.is_retryable() {
            return Some(error);
        }

        let run_id = ctx
            .input
            .map(|input| input.run_id.clone())
            .unwrap_or_default();

        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(run_id.clone()).or_insert(0);

        if *count >= self.max_retries {
            attempts.remove(&run_id);
            warn!(run_id = %run_id, max_retries = self.max_retries, "Retries exhausted");
            return Some(error);
        }

        *count += 1;
        info!(
            run_id = %run_id,
            attempt = *count,
            delay_ms = self.delay_ms,
            error = %error,
            "Scheduling retry"
        );
        ctx.metadata
            .insert("retry_attempt".to_string(), count.to_string());
        ctx.metadata
            .insert("retry_delay_ms".to_string(), self.delay_ms.to_string());
        None
    }
}

/// Records a deadline in the metadata and warns when a run overruns it.
///
/// The stage never aborts a run; enforcing the deadline belongs to the
/// transport.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout_ms: u64,
}

impl Default for TimeoutMiddleware {
    fn default() -> Self {
        Self::new(30_000)
    }
}

impl TimeoutMiddleware {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    fn on_request(&self, input: RunAgentInput, ctx: &mut MiddlewareContext<'_>) -> RunAgentInput {
        ctx.metadata
            .insert("timeout_ms".to_string(), self.timeout_ms.to_string());
        ctx.metadata.insert(
            "start_time".to_string(),
            Utc::now().timestamp_millis().to_string(),
        );
        input
    }

    fn on_response(
        &self,
        result: RunAgentResult,
        ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentResult {
        let started = ctx
            .metadata
            .get("start_time")
            .and_then(|s| s.parse::<i64>().ok());
        if let Some(started) = started {
            let elapsed = Utc::now().timestamp_millis().saturating_sub(started);
            if elapsed > self.timeout_ms as i64 {
                warn!(
                    run_id = %result.run_id,
                    elapsed_ms = elapsed,
                    timeout_ms = self.timeout_ms,
                    "Run exceeded its timeout"
                );
            }
        }
        result
    }
}

/// Refuses events of the configured types.
#[derive(Debug, Clone, Default)]
pub struct EventFilterMiddleware {
    blocked: HashSet<EventType>,
}

impl EventFilterMiddleware {
    pub fn new(blocked: impl IntoIterator<Item = EventType>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
        }
    }

    pub fn block(&mut self, event_type: EventType) {
        self.blocked.insert(event_type);
    }

    pub fn allow(&mut self, event_type: EventType) {
        self.blocked.remove(&event_type);
    }

    pub fn is_blocked(&self, event_type: EventType) -> bool {
        self.blocked.contains(&event_type)
    }
}

impl Middleware for EventFilterMiddleware {
    fn name(&self) -> &str {
        "event-filter"
    }

    fn should_process_event(&self, event: &Event, _ctx: &MiddlewareContext<'_>) -> bool {
        !self.is_blocked(event.event_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agstream_protocol::{EventKind, ToolCallStartEvent};
    use serde_json::json;

    #[test]
    fn test_retry_suppresses_until_limit() {
        let retry = RetryMiddleware::new(2, 250);
        let input = RunAgentInput::new("t", "r1");
        let state = json!({});
        let mut ctx = MiddlewareContext::new(&[], &state).with_input(&input);

        assert!(retry.on_error(AgentError::network("reset"), &mut ctx).is_none());
        assert_eq!(ctx.metadata.get("retry_attempt").map(String::as_str), Some("1"));
        assert_eq!(ctx.metadata.get("retry_delay_ms").map(String::as_str), Some("250"));

        assert!(retry.on_error(AgentError::timeout("slow"), &mut ctx).is_none());
        assert_eq!(retry.attempts("r1"), 2);

        let passed = retry.on_error(AgentError::network("reset"), &mut ctx);
        assert!(matches!(passed, Some(AgentError::Network { .. })));
        assert_eq!(retry.attempts("r1"), 0);
    }

    #[test]
    fn test_retry_count_cleared_on_success() {
        let retry = RetryMiddleware::new(3, 10);
        let input = RunAgentInput::new("t", "r1");
        let state = json!({});
        let mut ctx = MiddlewareContext::new(&[], &state).with_input(&input);

        assert!(retry.on_error(AgentError::network("reset"), &mut ctx).is_none());
        assert_eq!(retry.attempts("r1"), 1);

        let result = RunAgentResult {
            thread_id: "t".to_string(),
            run_id: "r1".to_string(),
            ..Default::default()
        };
        let result = retry.on_response(result, &mut ctx);
        assert_eq!(result.run_id, "r1");
        assert_eq!(retry.attempts("r1"), 0);
    }

    #[test]
    fn test_retry_ignores_non_retryable() {
        let retry = RetryMiddleware::default();
        let state = json!({});
        let mut ctx = MiddlewareContext::new(&[], &state);
        let passed = retry.on_error(AgentError::validation("bad path"), &mut ctx);
        assert!(matches!(passed, Some(AgentError::Validation { .. })));
        assert!(ctx.metadata.is_empty());
        assert_eq!(retry.max_retries(), 3);
        assert_eq!(retry.delay_ms(), 1000);
    }

    #[test]
    fn test_timeout_records_metadata() {
        let timeout = TimeoutMiddleware::default();
        let state = json!({});
        let mut ctx = MiddlewareContext::new(&[], &state);
        timeout.on_request(RunAgentInput::new("t", "r"), &mut ctx);
        assert_eq!(ctx.metadata.get("timeout_ms").map(String::as_str), Some("30000"));
        assert!(ctx.metadata["start_time"].parse::<i64>().is_ok());
    }

    #[test]
    fn test_event_filter() {
        let mut filter = EventFilterMiddleware::new([EventType::ToolCallStart]);
        let state = json!({});
        let ctx = MiddlewareContext::new(&[], &state);
        let event = Event::new(EventKind::ToolCallStart(ToolCallStartEvent {
            tool_call_id: "tc1".into(),
            tool_call_name: "search".into(),
            parent_message_id: None,
        }));

        assert!(!filter.should_process_event(&event, &ctx));
        filter.allow(EventType::ToolCallStart);
        assert!(filter.should_process_event(&event, &ctx));
        filter.block(EventType::ThinkingEnd);
        assert!(filter.is_blocked(EventType::ThinkingEnd));
    }
}
