//! Wire types for the agstream agent protocol client.
//!
//! This crate defines the data exchanged with an agent server:
//! - Conversation data (`Message`, `ToolCall`, `Tool`, `Context`)
//! - The outbound run request (`RunAgentInput`) and its result (`RunAgentResult`)
//! - The closed set of streamed protocol events (`Event`, `EventKind`) and
//!   their decoder
//!
//! Events arrive as one JSON object per SSE `data:` payload with a
//! SCREAMING_SNAKE_CASE `type` discriminator.

mod error;
mod fields;
mod event;
mod input;
mod message;

pub use error::{ProtocolError, ProtocolResult};
pub use event::*;
pub use input::{Context, RunAgentInput, RunAgentParams, RunAgentResult, Tool};
pub use message::{FunctionCall, Message, Role, ToolCall, FUNCTION_CALL_TYPE};
