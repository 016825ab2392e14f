//! The serializable snapshot of a timer.
//!
//! A `TimerState` is everything needed to reproduce a timer's trajectory in
//! another instance: feed it to `CountdownTimer::synchronize` (or
//! `TimerBuilder::restore`) and a running timer resumes from the instant its
//! last wakeup was measured. The record may be encoded with any serde format.

use crate::common::TimerId;
use crate::time::Timestamp;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A secondary status flag, separate from `running`.
///
/// `Stop` marks a stop that the next wakeup must honor even if `running`
/// has not flipped yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Running,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub id: TimerId,
    pub duration_ms: u64,
    pub running: bool,
    pub action: Action,
    pub total_elapsed_ms: u64,
    /// Start of the accumulation window the snapshot was taken in.
    /// `None` for a timer that has never been started.
    pub interval_start: Option<Timestamp>,
    pub label: Option<String>,
}

impl TimerState {
    pub fn is_finished(&self) -> bool {
        !self.running && self.total_elapsed_ms == self.duration_ms
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} [last=", self.total_elapsed_ms, self.duration_ms)?;
        match self.interval_start {
            Some(ms) => match DateTime::from_timestamp_millis(ms) {
                Some(at) => write!(f, "{}", at.to_rfc3339_opts(SecondsFormat::Millis, true))?,
                None => write!(f, "{ms}")?,
            },
            None => f.write_str("never")?,
        }
        write!(f, "][running={}]", self.running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TimerState {
        TimerState {
            id: TimerId(1003),
            duration_ms: 5000,
            running: true,
            action: Action::Running,
            total_elapsed_ms: 1200,
            interval_start: Some(1_700_000_000_000),
            label: Some("white clock".to_string()),
        }
    }

    #[test]
    fn encodes_with_flat_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], 1003);
        assert_eq!(json["duration_ms"], 5000);
        assert_eq!(json["running"], true);
        assert_eq!(json["action"], "running");
        assert_eq!(json["total_elapsed_ms"], 1200);
        assert_eq!(json["interval_start"], 1_700_000_000_000_i64);
        assert_eq!(json["label"], "white clock");
    }

    #[test]
    fn decodes_a_never_started_timer() {
        let state: TimerState = serde_json::from_str(
            r#"{"id":1000,"duration_ms":300,"running":false,"action":"stop",
                "total_elapsed_ms":0,"interval_start":null,"label":null}"#,
        )
        .unwrap();
        assert_eq!(state.action, Action::Stop);
        assert_eq!(state.interval_start, None);
        assert!(!state.is_finished());
    }

    #[test]
    fn finished_means_stopped_at_duration() {
        let mut state = sample();
        state.total_elapsed_ms = 5000;
        assert!(!state.is_finished());
        state.running = false;
        assert!(state.is_finished());
    }

    #[test]
    fn display_describes_progress() {
        assert_eq!(
            sample().to_string(),
            "1200/5000 [last=2023-11-14T22:13:20.000Z][running=true]"
        );
        let mut idle = sample();
        idle.interval_start = None;
        idle.running = false;
        assert_eq!(idle.to_string(), "1200/5000 [last=never][running=false]");
    }
}
