//! Testing utilities, fixtures, and mocks for agstream.
//!
//! This crate provides common testing infrastructure used across the agstream workspace:
//!
//! - **Fixtures**: SSE stream builders and wire-format event documents
//! - **Mocks**: Recording subscriber and middleware, scripted transport
//! - **Assertions**: Assertion macros and diffing helpers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use agstream_test_utils::{events, RecordingSubscriber, SseStreamBuilder};
//!
//! #[tokio::test]
//! async fn test_text_message() {
//!     let stream = SseStreamBuilder::new()
//!         .events(events::text_message("m1", &["Hi", " there"]))
//!         .build_bytes();
//!
//!     let recorder = Arc::new(RecordingSubscriber::new());
//!     agent.subscribe(recorder.clone());
//!     // feed `stream` through the agent ...
//!     assert!(recorder.was_called("on_text_message_end"));
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::{events, SseStreamBuilder};
pub use mocks::{HookCall, RecordingMiddleware, RecordingSubscriber, ScriptedTransport};
