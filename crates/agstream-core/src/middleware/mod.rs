//! Middleware pipeline.
//!
//! A [`MiddlewareChain`] holds ordered [`Middleware`] stages that may
//! rewrite the outbound request, the final result, each inbound event, and
//! errors. Requests and events pass the stages in registration order;
//! responses and errors pass them in reverse, so the last-registered stage
//! wraps innermost.
//!
//! The value being processed is threaded through the hook arguments. The
//! shared [`MiddlewareContext`] carries the run input, read-only views of the
//! session, the continue flag, and a string metadata map.

mod builtin;

pub use builtin::{EventFilterMiddleware, LoggingMiddleware, RetryMiddleware, TimeoutMiddleware};

use crate::error::AgentError;
use agstream_protocol::{Event, Message, RunAgentInput, RunAgentResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Mutable per-call context shared by every stage.
#[derive(Debug)]
pub struct MiddlewareContext<'a> {
    /// Input of the run being processed, if one is active.
    pub input: Option<&'a RunAgentInput>,
    pub messages: &'a [Message],
    pub state: &'a Value,
    /// Cleared by the request phase when a stage halts the run.
    pub should_continue: bool,
    pub metadata: HashMap<String, String>,
}

impl<'a> MiddlewareContext<'a> {
    pub fn new(messages: &'a [Message], state: &'a Value) -> Self {
        Self {
            input: None,
            messages,
            state,
            should_continue: true,
            metadata: HashMap::new(),
        }
    }

    pub fn with_input(mut self, input: &'a RunAgentInput) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn into_metadata(self) -> HashMap<String, String> {
        self.metadata
    }
}

/// A pipeline stage. Every hook defaults to pass-through.
pub trait Middleware: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str {
        "middleware"
    }

    fn on_request(&self, input: RunAgentInput, _ctx: &mut MiddlewareContext<'_>) -> RunAgentInput {
        input
    }

    fn on_response(
        &self,
        result: RunAgentResult,
        _ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentResult {
        result
    }

    /// Transform an event. `None` drops it and ends the chain.
    fn on_event(&self, event: Event, _ctx: &mut MiddlewareContext<'_>) -> Option<Event> {
        Some(event)
    }

    /// Handle an error. `None` suppresses it.
    fn on_error(&self, error: AgentError, _ctx: &mut MiddlewareContext<'_>) -> Option<AgentError> {
        Some(error)
    }

    /// Returning false halts the run before the transport is contacted.
    fn should_continue(&self, _input: &RunAgentInput, _ctx: &MiddlewareContext<'_>) -> bool {
        true
    }

    /// Returning false discards the event and everything generated for it.
    fn should_process_event(&self, _event: &Event, _ctx: &MiddlewareContext<'_>) -> bool {
        true
    }

    /// Events to emit ahead of the current one.
    fn before_event(&self, _event: &Event, _ctx: &mut MiddlewareContext<'_>) -> Vec<Event> {
        Vec::new()
    }

    /// Events to emit after the current one.
    fn after_event(&self, _event: &Event, _ctx: &mut MiddlewareContext<'_>) -> Vec<Event> {
        Vec::new()
    }
}

/// Handle returned by [`MiddlewareChain::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

/// Ordered list of middleware stages.
#[derive(Default)]
pub struct MiddlewareChain {
    stages: Vec<(MiddlewareId, Arc<dyn Middleware>)>,
    next_id: u64,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: Arc<dyn Middleware>) -> MiddlewareId {
        self.next_id += 1;
        let id = MiddlewareId(self.next_id);
        debug!(middleware = middleware.name(), "Registered middleware");
        self.stages.push((id, middleware));
        id
    }

    /// Returns false if `id` is not registered.
    pub fn remove(&mut self, id: MiddlewareId) -> bool {
        let before = self.stages.len();
        self.stages.retain(|(sid, _)| *sid != id);
        self.stages.len() != before
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn forward(&self) -> impl Iterator<Item = &Arc<dyn Middleware>> {
        self.stages.iter().map(|(_, m)| m)
    }

    fn reverse(&self) -> impl Iterator<Item = &Arc<dyn Middleware>> {
        self.stages.iter().rev().map(|(_, m)| m)
    }

    /// Request phase, in registration order.
    ///
    /// A stage that halts still applies its `on_request` before the chain
    /// stops; `ctx.should_continue` is then false.
    pub fn process_request(
        &self,
        input: RunAgentInput,
        ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentInput {
        let mut current = input;
        for middleware in self.forward() {
            let proceed = middleware.should_continue(&current, ctx);
            current = middleware.on_request(current, ctx);
            if !proceed {
                debug!(middleware = middleware.name(), "Request halted by middleware");
                ctx.should_continue = false;
                break;
            }
        }
        current
    }

    /// Response phase, in reverse registration order.
    pub fn process_response(
        &self,
        result: RunAgentResult,
        ctx: &mut MiddlewareContext<'_>,
    ) -> RunAgentResult {
        self.reverse()
            .fold(result, |current, middleware| middleware.on_response(current, ctx))
    }

    /// Error phase, in reverse registration order. `None` means a stage
    /// suppressed the error.
    pub fn process_error(
        &self,
        error: AgentError,
        ctx: &mut MiddlewareContext<'_>,
    ) -> Option<AgentError> {
        let mut current = error;
        for middleware in self.reverse() {
            match middleware.on_error(current, ctx) {
                Some(error) => current = error,
                None => {
                    debug!(middleware = middleware.name(), "Error suppressed by middleware");
                    return None;
                }
            }
        }
        Some(current)
    }

    /// Event phase, in registration order.
    ///
    /// Output is every stage's before-events in stage order, then the
    /// transformed event if it survived, then every after-event. A refusing
    /// stage yields an empty output.
    pub fn process_event(&self, event: Event, ctx: &mut MiddlewareContext<'_>) -> Vec<Event> {
        let mut before = Vec::new();
        let mut after = Vec::new();
        let mut current = Some(event);

        for middleware in self.forward() {
            let Some(event) = current.take() else {
                break;
            };

            if !middleware.should_process_event(&event, ctx) {
                debug!(
                    middleware = middleware.name(),
                    event_type = %event.event_type(),
                    "Event refused by middleware"
                );
                return Vec::new();
            }

            before.extend(middleware.before_event(&event, ctx));
            current = middleware.on_event(event, ctx);
            if let Some(event) = &current {
                after.extend(middleware.after_event(event, ctx));
            }
        }

        before.into_iter().chain(current).chain(after).collect()
    }
}
