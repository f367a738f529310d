//! RAII-based timing utilities for measuring and logging operation durations.
//!
//! # Example
//!
//! ```rust,ignore
//! use agstream_util::timing::TimingGuard;
//!
//! fn drive(run_id: &str) {
//!     let _timing = TimingGuard::run(run_id);
//!     // ... feed chunks ...
//!     // Duration is logged when _timing is dropped
//! }
//! ```

use std::time::Instant;
use tracing::{debug, info, warn};

/// RAII guard that measures and logs the duration of an operation.
///
/// When dropped, logs the elapsed time since creation.
pub struct TimingGuard {
    /// Type of operation (e.g., "run", "replay")
    operation_type: &'static str,
    /// Name of the specific operation (usually an id)
    operation_name: String,
    start: Instant,
    /// Minimum duration to log at info level (below this uses debug)
    info_threshold_ms: u64,
    /// Minimum duration to log at warn level
    warn_threshold_ms: u64,
}

impl TimingGuard {
    /// Create a new timing guard.
    pub fn new(operation_type: &'static str, operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        debug!(
            operation_type = operation_type,
            operation_name = %operation_name,
            "Starting operation"
        );
        Self {
            operation_type,
            operation_name,
            start: Instant::now(),
            info_threshold_ms: 1000,
            warn_threshold_ms: 30_000,
        }
    }

    /// Create a timing guard for one agent run.
    pub fn run(run_id: impl Into<String>) -> Self {
        Self::new("run", run_id)
    }

    /// Set the threshold for info-level logging (in milliseconds).
    pub fn with_info_threshold(mut self, ms: u64) -> Self {
        self.info_threshold_ms = ms;
        self
    }

    /// Set the threshold for warn-level logging (in milliseconds).
    pub fn with_warn_threshold(mut self, ms: u64) -> Self {
        self.warn_threshold_ms = ms;
        self
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis();

        let duration_str = if duration_ms < 1000 {
            format!("{duration_ms}ms")
        } else {
            format!("{:.2}s", duration_ms as f64 / 1000.0)
        };

        if duration_ms >= self.warn_threshold_ms as u128 {
            warn!(
                operation_type = self.operation_type,
                operation_name = %self.operation_name,
                duration_ms = duration_ms as u64,
                duration = %duration_str,
                "Slow operation completed"
            );
        } else if duration_ms >= self.info_threshold_ms as u128 {
            info!(
                operation_type = self.operation_type,
                operation_name = %self.operation_name,
                duration_ms = duration_ms as u64,
                duration = %duration_str,
                "Operation completed"
            );
        } else {
            debug!(
                operation_type = self.operation_type,
                operation_name = %self.operation_name,
                duration_ms = duration_ms as u64,
                duration = %duration_str,
                "Operation completed"
            );
        }
    }
}
