//! The countdown state machine.
//!
//! `TimerCore` owns every piece of timer state and performs every
//! transition, but it neither reads a clock nor spawns anything. Each
//! transition takes the current time as an argument and returns a `Step`:
//! the events to emit and the change, if any, to the periodic wakeup.
//! `CountdownTimer` applies steps under its lock.

use crate::common::TimerId;
use crate::config::TimerSettings;
use crate::events::TimerEvent;
use crate::state::{Action, TimerState};
use crate::time::Timestamp;

/// A change to the periodic wakeup, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Driver {
    /// Spawn a wakeup. Only requested when none is armed.
    Arm(u64),
    /// Replace the armed wakeup with one at a new period.
    Rearm(u64),
    Disarm,
}

/// The outcome of one transition.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Step {
    pub events: Vec<TimerEvent>,
    pub driver: Option<Driver>,
}

impl Step {
    fn idle() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub(crate) struct TimerCore {
    pub(crate) id: TimerId,
    pub(crate) label: Option<String>,
    duration_ms: u64,
    total_elapsed_ms: u64,
    running: bool,
    action: Action,
    interval_start: Option<Timestamp>,
    settings: TimerSettings,
    /// Period of the armed wakeup. `Some` exactly while `running`.
    armed_period: Option<u64>,
}

impl TimerCore {
    pub(crate) fn new(id: TimerId, duration_ms: u64, settings: TimerSettings) -> Self {
        Self {
            id,
            label: None,
            duration_ms,
            total_elapsed_ms: 0,
            running: false,
            action: Action::Running,
            interval_start: None,
            settings,
            armed_period: None,
        }
    }

    pub(crate) fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub(crate) fn total_elapsed_ms(&self) -> u64 {
        self.total_elapsed_ms
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn is_finished(&self) -> bool {
        !self.running && self.total_elapsed_ms == self.duration_ms
    }

    pub(crate) fn wakeup_armed(&self) -> bool {
        self.armed_period.is_some()
    }

    pub(crate) fn tick_interval_ms(&self) -> u64 {
        self.settings.tick_interval_ms
    }

    /// Takes effect the next time a wakeup is armed.
    pub(crate) fn set_tick_interval_ms(&mut self, interval_ms: u64) {
        self.settings.tick_interval_ms = interval_ms.max(1);
    }

    /// Elapsed time including the open interval since the last wakeup.
    pub(crate) fn elapsed_at(&self, now: Timestamp) -> u64 {
        if self.running {
            self.total_elapsed_ms
                .saturating_add(self.delta_since_last(now))
                .min(self.duration_ms)
        } else {
            self.total_elapsed_ms
        }
    }

    fn delta_since_last(&self, now: Timestamp) -> u64 {
        self.interval_start
            .map(|start| u64::try_from(now.saturating_sub(start)).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Starts the timer. `at` forces a (re)start measured from that instant
    /// even if the timer is running or finished; without it, starting a
    /// running or finished timer does nothing.
    pub(crate) fn start(&mut self, now: Timestamp, at: Option<Timestamp>) -> Step {
        if at.is_none() && (self.running || self.is_finished()) {
            return Step::idle();
        }
        self.running = true;
        self.action = Action::Running;
        self.interval_start = Some(at.unwrap_or(now));

        if self.armed_period.is_some() {
            return Step::idle();
        }
        let period = self.settings.tick_interval_ms.max(1);
        self.armed_period = Some(period);
        Step {
            events: vec![TimerEvent::Started { timer: self.id }],
            driver: Some(Driver::Arm(period)),
        }
    }

    /// Stops the timer, keeping the time accumulated up to `now`.
    ///
    /// If that time already covers the duration, the elapsed time is clamped
    /// and `Finished` follows `Stopped`.
    pub(crate) fn stop(&mut self, now: Timestamp) -> Step {
        if !self.running {
            return Step::idle();
        }
        let partial = self.delta_since_last(now);
        self.interval_start = Some(now);
        self.total_elapsed_ms = self
            .total_elapsed_ms
            .saturating_add(partial)
            .min(self.duration_ms);
        self.armed_period = None;
        self.running = false;
        self.action = Action::Stop;

        let mut events = vec![TimerEvent::Stopped { timer: self.id }];
        if self.is_finished() {
            events.push(TimerEvent::Finished { timer: self.id });
        }
        Step {
            events,
            driver: Some(Driver::Disarm),
        }
    }

    /// Stops without notifying anyone. Used when the timer is destroyed.
    pub(crate) fn halt(&mut self, now: Timestamp) -> Step {
        let mut step = self.stop(now);
        step.events.clear();
        step
    }

    /// Returns to zero elapsed time. A timer that is already pristine is
    /// left alone, so repeated resets notify once.
    pub(crate) fn reset(&mut self) -> Step {
        let pristine = !self.running
            && self.total_elapsed_ms == 0
            && self.armed_period.is_none()
            && self.action == Action::Running;
        if pristine {
            return Step::idle();
        }
        let driver = self.armed_period.take().map(|_| Driver::Disarm);
        self.running = false;
        self.action = Action::Running;
        self.total_elapsed_ms = 0;
        Step {
            events: vec![TimerEvent::Reset { timer: self.id }],
            driver,
        }
    }

    /// Handles one periodic wakeup.
    pub(crate) fn wakeup(&mut self, now: Timestamp) -> Step {
        let delta = self.delta_since_last(now);
        self.interval_start = Some(now);

        if self.action == Action::Stop || !self.running {
            self.running = false;
            self.armed_period = None;
            return Step {
                events: Vec::new(),
                driver: Some(Driver::Disarm),
            };
        }

        self.total_elapsed_ms = self.total_elapsed_ms.saturating_add(delta);
        if self.total_elapsed_ms >= self.duration_ms {
            self.armed_period = None;
            self.running = false;
            self.total_elapsed_ms = self.duration_ms;
            return Step {
                events: vec![TimerEvent::Finished { timer: self.id }],
                driver: Some(Driver::Disarm),
            };
        }

        let mut step = Step {
            events: vec![TimerEvent::Tick {
                timer: self.id,
                elapsed_ms: self.total_elapsed_ms,
            }],
            driver: None,
        };
        if self.settings.adjust_interval_near_finish {
            let remaining = self.duration_ms - self.total_elapsed_ms;
            let minimum = self.settings.minimum_interval_ms.max(1);
            if let Some(period) = self.armed_period {
                if remaining < period && period != minimum {
                    self.armed_period = Some(minimum);
                    step.driver = Some(Driver::Rearm(minimum));
                }
            }
        }
        step
    }

    pub(crate) fn snapshot(&self) -> TimerState {
        TimerState {
            id: self.id,
            duration_ms: self.duration_ms,
            running: self.running,
            action: self.action,
            total_elapsed_ms: self.total_elapsed_ms,
            interval_start: self.interval_start,
            label: self.label.clone(),
        }
    }

    /// Overwrites this timer with `state`. A running snapshot resumes from
    /// its own `interval_start`, so no elapsed time is lost in transit.
    pub(crate) fn restore(&mut self, state: &TimerState, now: Timestamp) -> Step {
        let was_armed = self.armed_period.take().is_some();

        self.id = state.id;
        self.label = state.label.clone();
        self.duration_ms = state.duration_ms;
        self.action = state.action;
        self.total_elapsed_ms = state.total_elapsed_ms.min(state.duration_ms);
        self.interval_start = state.interval_start;
        self.running = false;

        let mut step = Step::idle();
        if state.running {
            step = self.start(now, Some(state.interval_start.unwrap_or(now)));
        }
        step.driver = match (was_armed, step.driver) {
            (true, Some(Driver::Arm(period))) => Some(Driver::Rearm(period)),
            (true, _) => Some(Driver::Disarm),
            (false, driver) => driver,
        };
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = 1_700_000_000_000;
    const ID: TimerId = TimerId(1000);

    fn core(duration_ms: u64) -> TimerCore {
        TimerCore::new(ID, duration_ms, TimerSettings::default())
    }

    fn started(duration_ms: u64) -> TimerCore {
        let mut core = core(duration_ms);
        core.start(T0, None);
        core
    }

    #[test]
    fn start_arms_and_notifies_once() {
        let mut core = core(1000);
        let step = core.start(T0, None);
        assert_eq!(step.events, vec![TimerEvent::Started { timer: ID }]);
        assert_eq!(step.driver, Some(Driver::Arm(200)));
        assert!(core.is_running());

        assert_eq!(core.start(T0 + 50, None), Step::idle());
        assert_eq!(core.snapshot().interval_start, Some(T0));
    }

    #[test]
    fn wakeups_accumulate_and_tick() {
        let mut core = started(1000);
        let step = core.wakeup(T0 + 200);
        assert_eq!(
            step.events,
            vec![TimerEvent::Tick {
                timer: ID,
                elapsed_ms: 200
            }]
        );
        assert_eq!(step.driver, None);
        core.wakeup(T0 + 410);
        assert_eq!(core.total_elapsed_ms(), 410);
    }

    #[test]
    fn finish_clamps_to_duration() {
        let mut core = started(1000);
        core.wakeup(T0 + 900);
        let step = core.wakeup(T0 + 1130);
        assert_eq!(step.events, vec![TimerEvent::Finished { timer: ID }]);
        assert_eq!(step.driver, Some(Driver::Disarm));
        assert_eq!(core.total_elapsed_ms(), 1000);
        assert!(core.is_finished());
        assert!(!core.wakeup_armed());
    }

    #[test]
    fn finished_timer_ignores_plain_start() {
        let mut core = started(100);
        core.wakeup(T0 + 100);
        assert!(core.is_finished());
        assert_eq!(core.start(T0 + 200, None), Step::idle());
        assert!(core.is_finished());
    }

    #[test]
    fn stop_keeps_partial_interval() {
        let mut core = started(5000);
        core.wakeup(T0 + 200);
        let step = core.stop(T0 + 350);
        assert_eq!(step.events, vec![TimerEvent::Stopped { timer: ID }]);
        assert_eq!(step.driver, Some(Driver::Disarm));
        assert_eq!(core.total_elapsed_ms(), 350);
        assert_eq!(core.snapshot().action, Action::Stop);

        assert_eq!(core.stop(T0 + 900), Step::idle());
        assert_eq!(core.total_elapsed_ms(), 350);
    }

    #[test]
    fn stop_past_duration_stops_then_finishes() {
        let mut core = started(300);
        core.wakeup(T0 + 200);
        let step = core.stop(T0 + 320);
        assert_eq!(
            step.events,
            vec![
                TimerEvent::Stopped { timer: ID },
                TimerEvent::Finished { timer: ID }
            ]
        );
        assert_eq!(step.driver, Some(Driver::Disarm));
        assert!(core.is_finished());
        assert_eq!(core.total_elapsed_ms(), 300);
    }

    #[test]
    fn pause_time_is_not_counted() {
        let mut core = started(10_000);
        core.stop(T0 + 1000);
        core.start(T0 + 5000, None);
        core.wakeup(T0 + 5200);
        core.stop(T0 + 6000);
        assert_eq!(core.total_elapsed_ms(), 2000);
    }

    #[test]
    fn pending_stop_is_honored_by_next_wakeup() {
        let mut core = started(1000);
        core.action = Action::Stop;
        let step = core.wakeup(T0 + 200);
        assert!(step.events.is_empty());
        assert_eq!(step.driver, Some(Driver::Disarm));
        assert!(!core.is_running());
        assert_eq!(core.total_elapsed_ms(), 0);
    }

    #[test]
    fn reset_returns_to_zero_once() {
        let mut core = started(1000);
        core.wakeup(T0 + 200);
        let step = core.reset();
        assert_eq!(step.events, vec![TimerEvent::Reset { timer: ID }]);
        assert_eq!(step.driver, Some(Driver::Disarm));
        assert_eq!(core.total_elapsed_ms(), 0);
        assert!(!core.is_running());

        assert_eq!(core.reset(), Step::idle());
    }

    #[test]
    fn reset_after_finish_allows_reuse() {
        let mut core = started(100);
        core.wakeup(T0 + 150);
        let step = core.reset();
        assert_eq!(step.driver, None);
        assert!(!core.is_finished());

        let step = core.start(T0 + 1000, None);
        assert_eq!(step.driver, Some(Driver::Arm(200)));
        core.wakeup(T0 + 1050);
        assert_eq!(core.total_elapsed_ms(), 50);
    }

    #[test]
    fn forced_start_on_running_timer_moves_window_only() {
        let mut core = started(1000);
        let step = core.start(T0 + 500, Some(T0 + 100));
        assert_eq!(step, Step::idle());
        core.wakeup(T0 + 300);
        assert_eq!(core.total_elapsed_ms(), 200);
    }

    #[test]
    fn near_finish_rearms_at_minimum_interval() {
        let settings = TimerSettings {
            tick_interval_ms: 500,
            adjust_interval_near_finish: true,
            minimum_interval_ms: 20,
        };
        let mut core = TimerCore::new(ID, 1200, settings);
        core.start(T0, None);
        assert_eq!(core.wakeup(T0 + 500).driver, None);
        assert_eq!(core.wakeup(T0 + 1000).driver, Some(Driver::Rearm(20)));
        assert_eq!(core.wakeup(T0 + 1020).driver, None);
        let step = core.wakeup(T0 + 1200);
        assert_eq!(step.events, vec![TimerEvent::Finished { timer: ID }]);
    }

    #[test]
    fn near_finish_is_off_by_default() {
        let mut core = started(300);
        assert_eq!(core.wakeup(T0 + 200).driver, None);
    }

    #[test]
    fn interval_changes_apply_to_next_arm() {
        let mut core = core(1000);
        core.set_tick_interval_ms(0);
        assert_eq!(core.tick_interval_ms(), 1);
        core.set_tick_interval_ms(50);
        assert_eq!(core.start(T0, None).driver, Some(Driver::Arm(50)));
    }

    #[test]
    fn live_elapsed_includes_open_interval() {
        let mut core = started(1000);
        core.wakeup(T0 + 200);
        assert_eq!(core.elapsed_at(T0 + 290), 290);
        assert_eq!(core.elapsed_at(T0 + 5000), 1000);
        assert_eq!(core.total_elapsed_ms(), 200);
    }

    #[test]
    fn backwards_clock_counts_as_zero() {
        let mut core = started(1000);
        core.wakeup(T0 - 500);
        assert_eq!(core.total_elapsed_ms(), 0);
    }

    #[test]
    fn restore_running_snapshot_resumes_from_its_window() {
        let mut source = started(2000);
        source.label = Some("black".to_string());
        source.wakeup(T0 + 400);
        let state = source.snapshot();

        let mut target = TimerCore::new(TimerId(2000), 10, TimerSettings::default());
        let step = target.restore(&state, T0 + 450);
        assert_eq!(step.events, vec![TimerEvent::Started { timer: ID }]);
        assert_eq!(step.driver, Some(Driver::Arm(200)));
        assert_eq!(target.snapshot(), state);

        target.wakeup(T0 + 600);
        source.wakeup(T0 + 600);
        assert_eq!(target.total_elapsed_ms(), source.total_elapsed_ms());
    }

    #[test]
    fn restore_over_running_timer_replaces_wakeup() {
        let mut target = started(1000);
        let state = core(500).snapshot();
        let step = target.restore(&state, T0 + 10);
        assert!(step.events.is_empty());
        assert_eq!(step.driver, Some(Driver::Disarm));
        assert!(!target.is_running());

        let mut running = started(3000);
        let step = running.restore(&started(3000).snapshot(), T0 + 10);
        assert_eq!(step.driver, Some(Driver::Rearm(200)));
    }

    #[test]
    fn restore_clamps_elapsed() {
        let mut state = core(100).snapshot();
        state.total_elapsed_ms = 250;
        let mut target = core(1);
        target.restore(&state, T0);
        assert_eq!(target.total_elapsed_ms(), 100);
        assert!(target.is_finished());
    }
}
