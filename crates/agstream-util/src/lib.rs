//! Shared utilities for agstream.
//!
//! This crate provides common utilities used across the agstream workspace:
//! - ULID-based identifier generation
//! - Logging setup with tracing
//! - RAII-based timing for run measurement

pub mod id;
pub mod log;
pub mod timing;

pub use id::{IdPrefix, Identifier};
pub use timing::TimingGuard;
