//! Time sources for measuring elapsed time.
//!
//! Timestamps are plain epoch milliseconds so that a snapshot taken from one
//! timer can be replayed by another, as long as both read the same clock.

use chrono::Utc;
use std::sync::Arc;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Supplies the current time to a timer.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Timestamp;
}

/// Reads the system wall clock.
///
/// Clock steps (NTP adjustments and the like) show up directly in measured
/// deltas. Backwards steps are counted as zero elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl WallClock {
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(WallClock)
    }
}

impl Clock for WallClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// Reads Tokio's monotonic clock, anchored to wall time at construction.
///
/// Immune to wall clock steps after it is created, and follows
/// `tokio::time::pause`/`advance`, which makes timer tests deterministic.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_wall: Timestamp,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now().timestamp_millis(),
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        let since = tokio::time::Instant::now().saturating_duration_since(self.anchor);
        self.anchor_wall + since.as_millis() as Timestamp
    }
}
