//! Event-streaming core for agstream.
//!
//! This crate turns an agent server's SSE response into session state:
//! - Stream framing (`SseFramer`) of arbitrarily split byte chunks
//! - JSON-Patch state updates with optional snapshot history (`StateStore`)
//! - The session reducer with partial-delta buffering and subscriber hooks
//! - A four-phase middleware pipeline (request, response, event, error)
//! - The run driver (`Agent`) tying the pieces together
//! - Configuration loading (JSONC, env overrides)

pub mod agent;
pub mod config;
pub mod error;
pub mod framer;
pub mod id;
pub mod middleware;
pub mod patch;
pub mod reducer;
pub mod subscriber;

pub use agent::{
    ActiveRun, Agent, AgentBuilder, ByteStream, RunRequest, Transport, TransportRequest,
};
pub use config::{AgentConfig, HistoryConfig, MalformedPayloadPolicy};
pub use error::{AgentError, AgentResult, ConfigError, ErrorCode, ErrorKind, RecoveryStrategy};
pub use framer::{frame_stream, SseFramer};
pub use id::{IdGenerator, SequentialIdGenerator, UlidGenerator};
pub use middleware::{
    EventFilterMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareContext,
    MiddlewareId, RetryMiddleware, TimeoutMiddleware,
};
pub use patch::{JsonPointer, PatchOp, PatchOptions, StateStore};
pub use reducer::SessionReducer;
pub use subscriber::{HookResult, Mutation, Subscriber, SubscriberId, SubscriberParams};
