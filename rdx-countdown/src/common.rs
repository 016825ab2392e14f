//! Contains common, primitive types used across the crate.
//!
//! This module defines the identifiers handed out for timers and registered
//! observers, and the `IdGenerator` seam through which a timer obtains its id.
//! Using distinct types keeps timer ids and listener keys from being mixed up.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// The first id handed out by the process-wide generator.
pub const FIRST_TIMER_ID: u64 = 1000;

new_key_type! {
    /// Uniquely identifies an observer registered on a single timer.
    ///
    /// Returned by every registration call and accepted by
    /// `CountdownTimer::remove_callback`. Keys are never reused, so a stale
    /// key cannot remove somebody else's observer.
    pub struct ListenerId;
}

/// Identifies a timer within the process.
///
/// Ids are unique among co-existing timers unless one is explicitly
/// overwritten by restoring a snapshot taken from another timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer[{}]", self.0)
    }
}

/// Produces ids for newly constructed timers.
///
/// Any `Fn() -> u64` closure is a generator, which is convenient in tests.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> TimerId;
}

impl<F> IdGenerator for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn next_id(&self) -> TimerId {
        TimerId(self())
    }
}

/// A monotonically increasing atomic counter.
#[derive(Debug)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates an isolated sequence whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// The process-wide sequence used when no generator is supplied.
    pub fn global() -> Arc<SequentialIds> {
        static GLOBAL: OnceLock<Arc<SequentialIds>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(SequentialIds::starting_at(FIRST_TIMER_ID)))
            .clone()
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::starting_at(FIRST_TIMER_ID)
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> TimerId {
        TimerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_first_timer_id() {
        let ids = SequentialIds::default();
        assert_eq!(ids.next_id(), TimerId(1000));
        assert_eq!(ids.next_id(), TimerId(1001));
        assert_eq!(ids.next_id(), TimerId(1002));
    }

    #[test]
    fn isolated_sequences_do_not_share_state() {
        let a = SequentialIds::starting_at(1);
        let b = SequentialIds::starting_at(1);
        assert_eq!(a.next_id(), TimerId(1));
        assert_eq!(a.next_id(), TimerId(2));
        assert_eq!(b.next_id(), TimerId(1));
    }

    #[test]
    fn global_sequence_is_shared() {
        let first = SequentialIds::global().next_id();
        let second = SequentialIds::global().next_id();
        assert!(second > first);
        assert!(first.0 >= FIRST_TIMER_ID);
    }

    #[test]
    fn closures_are_generators() {
        let fixed = || 42_u64;
        assert_eq!(fixed.next_id(), TimerId(42));
    }

    #[test]
    fn display_names_the_timer() {
        assert_eq!(TimerId(1007).to_string(), "Timer[1007]");
    }
}
