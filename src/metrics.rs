//! Transfer counters and timing.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Row counters for one transfer.
///
/// Both counters only ever increase while rows are copied; once the source
/// cursor is exhausted the value is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Rows pulled from the source and handed to the inserter
    pub rows_attempted: u64,
    /// Rows the destination accepted
    pub rows_inserted: u64,
}

impl TransferStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row handed to the inserter.
    pub fn record_attempt(&mut self) {
        self.rows_attempted += 1;
    }

    /// Record a row the destination accepted.
    pub fn record_insert(&mut self) {
        self.rows_inserted += 1;
    }

    /// Rows that were attempted but not inserted.
    pub fn rows_failed(&self) -> u64 {
        self.rows_attempted - self.rows_inserted
    }

    /// Whether every attempted row was inserted.
    pub fn is_complete(&self) -> bool {
        self.rows_attempted == self.rows_inserted
    }

    /// Inserted rows per second over `duration_ms`.
    pub fn rows_per_second(&self, duration_ms: u64) -> f64 {
        if duration_ms == 0 {
            0.0
        } else {
            (self.rows_inserted as f64 * 1000.0) / duration_ms as f64
        }
    }
}

/// Timer for measuring operation duration.
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration.
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}ms", self.label, elapsed);
        elapsed
    }
}
