//! Defines the event types a countdown timer emits.
//!
//! Observers register for an `EventKind` and receive the matching
//! `TimerEvent`. The same events are broadcast to every subscriber of
//! `CountdownTimer::subscribe`.

use crate::common::TimerId;
use crate::error::TimerError;
use std::fmt;
use std::str::FromStr;

/// The lifecycle transitions an observer can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Stop,
    Finish,
    Tick,
    Reset,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Start,
        EventKind::Stop,
        EventKind::Finish,
        EventKind::Tick,
        EventKind::Reset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
            EventKind::Finish => "finish",
            EventKind::Tick => "tick",
            EventKind::Reset => "reset",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = TimerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TimerError::InvalidEventKind(s.to_string()))
    }
}

/// A notification emitted by a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The timer began running and armed its wakeup.
    Started { timer: TimerId },
    /// The timer was stopped before reaching its duration.
    Stopped { timer: TimerId },
    /// A wakeup advanced the timer without finishing it.
    Tick { timer: TimerId, elapsed_ms: u64 },
    /// The elapsed time reached the duration. Fired once per run.
    Finished { timer: TimerId },
    /// The timer was returned to zero.
    Reset { timer: TimerId },
}

impl TimerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TimerEvent::Started { .. } => EventKind::Start,
            TimerEvent::Stopped { .. } => EventKind::Stop,
            TimerEvent::Tick { .. } => EventKind::Tick,
            TimerEvent::Finished { .. } => EventKind::Finish,
            TimerEvent::Reset { .. } => EventKind::Reset,
        }
    }

    /// The id of the timer that emitted the event.
    pub fn timer(&self) -> TimerId {
        match *self {
            TimerEvent::Started { timer }
            | TimerEvent::Stopped { timer }
            | TimerEvent::Tick { timer, .. }
            | TimerEvent::Finished { timer }
            | TimerEvent::Reset { timer } => timer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_kind() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "pause".parse::<EventKind>().unwrap_err();
        assert!(matches!(err, TimerError::InvalidEventKind(ref name) if name == "pause"));
        assert!(err.to_string().contains("pause"));
    }

    #[test]
    fn kind_names_are_case_sensitive() {
        assert!("Start".parse::<EventKind>().is_err());
    }

    #[test]
    fn events_report_kind_and_timer() {
        let tick = TimerEvent::Tick {
            timer: TimerId(1001),
            elapsed_ms: 400,
        };
        assert_eq!(tick.kind(), EventKind::Tick);
        assert_eq!(tick.timer(), TimerId(1001));
        assert_eq!(
            TimerEvent::Reset { timer: TimerId(7) }.kind(),
            EventKind::Reset
        );
    }
}
