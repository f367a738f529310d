//! Injectable id generation.
//!
//! The reducer synthesizes ids for thinking messages and tool results. The
//! generator is injected so tests can make those ids deterministic.

use agstream_util::{IdPrefix, Identifier};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh identifiers.
#[cfg_attr(test, mockall::automock)]
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: IdPrefix) -> String;
}

/// ULID-backed generator (`msg_01h...`).
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn next_id(&self, prefix: IdPrefix) -> String {
        Identifier::ascending(prefix)
    }
}

/// Counter-backed generator producing `prefix_1`, `prefix_2`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self, prefix: IdPrefix) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", prefix.as_str(), n)
    }
}
