//! The countdown timer handle.

use crate::common::{IdGenerator, ListenerId, SequentialIds, TimerId};
use crate::components::observer::{Observer, ObserverRegistry};
use crate::components::wakeup::{Wakeup, WakeupOutcome, WakeupTarget};
use crate::config::TimerSettings;
use crate::error::{Result, TimerError};
use crate::events::{EventKind, TimerEvent};
use crate::machine::{Driver, Step, TimerCore};
use crate::state::TimerState;
use crate::time::{Clock, Timestamp, WallClock};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A resumable, serializable countdown timer.
///
/// The timer accumulates running time across any number of start/stop
/// cycles until it reaches its duration, waking up every tick interval to
/// advance and notify observers. Its state can be captured with
/// [`state`](Self::state) and reproduced in another instance with
/// [`synchronize`](Self::synchronize).
///
/// `CountdownTimer` is a cheap handle; clones control the same timer. The
/// periodic wakeup runs as a Tokio task, so [`start`](Self::start) must be
/// called from within a Tokio runtime. Dropping the last handle cancels the
/// wakeup. An observer that captures a handle to its own timer keeps the
/// timer alive until the observer is removed.
///
/// Control calls such as [`stop`](Self::stop) return once their observers
/// have run. If another thread is delivering events at that moment, the call
/// blocks until the delivery reaches its own events, so observers should not
/// wait on other threads that drive the same timer.
#[derive(Clone)]
pub struct CountdownTimer {
    shared: Arc<Shared>,
}

struct Guarded {
    core: TimerCore,
    wakeup: Option<Wakeup>,
    generation: u64,
}

/// Events waiting for their observers. Each event gets a sequence number;
/// `delivered` is the highest number whose observers have all run.
#[derive(Default)]
struct Dispatch {
    queue: VecDeque<(u64, TimerEvent)>,
    queued: u64,
    delivered: u64,
    deliverer: Option<ThreadId>,
}

struct Shared {
    guarded: Mutex<Guarded>,
    observers: Mutex<ObserverRegistry>,
    dispatch: Mutex<Dispatch>,
    delivered: Condvar,
    event_sender: broadcast::Sender<TimerEvent>,
    clock: Arc<dyn Clock>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// Core implementation block for internal logic.
impl Shared {
    /// Applies a step computed outside the wakeup task.
    fn commit(self: &Arc<Self>, guarded: &mut Guarded, step: Step) -> u64 {
        match step.driver {
            Some(Driver::Arm(period_ms)) => self.arm(guarded, period_ms),
            Some(Driver::Rearm(period_ms)) => {
                Self::disarm(guarded);
                self.arm(guarded, period_ms);
            }
            Some(Driver::Disarm) => Self::disarm(guarded),
            None => {}
        }
        self.enqueue(step.events)
    }

    fn arm(self: &Arc<Self>, guarded: &mut Guarded, period_ms: u64) {
        Self::disarm(guarded);
        guarded.generation += 1;
        trace!(
            timer = %guarded.core.id,
            period_ms,
            generation = guarded.generation,
            "Arming wakeup."
        );
        guarded.wakeup = Some(Wakeup::arm(
            Arc::downgrade(self),
            guarded.generation,
            Duration::from_millis(period_ms),
        ));
    }

    fn disarm(guarded: &mut Guarded) {
        if let Some(wakeup) = guarded.wakeup.take() {
            wakeup.cancel();
        }
    }

    /// Queues events in emission order and returns the sequence number of
    /// the last one queued so far. Called with the state lock held so that
    /// concurrent transitions cannot reorder their notifications.
    fn enqueue(&self, events: Vec<TimerEvent>) -> u64 {
        let mut dispatch = lock(&self.dispatch);
        for event in events {
            self.event_sender.send(event).ok();
            dispatch.queued += 1;
            let seq = dispatch.queued;
            dispatch.queue.push_back((seq, event));
        }
        dispatch.queued
    }

    /// Delivers queued events to observers until every event up to `ticket`
    /// has been delivered. Must be called without the state lock.
    ///
    /// Only one thread delivers at a time; other callers wait for it. Events
    /// queued by an observer calling back into the timer are delivered by
    /// the outer delivery once the current observer returns.
    fn flush(&self, ticket: u64) {
        let me = thread::current().id();
        let mut dispatch = lock(&self.dispatch);
        loop {
            if dispatch.delivered >= ticket || dispatch.deliverer == Some(me) {
                return;
            }
            if dispatch.deliverer.is_none() {
                break;
            }
            dispatch = self
                .delivered
                .wait(dispatch)
                .unwrap_or_else(PoisonError::into_inner);
        }
        dispatch.deliverer = Some(me);
        drop(dispatch);

        let _delivering = Delivering { shared: self };
        loop {
            let (seq, event) = match lock(&self.dispatch).queue.pop_front() {
                Some(next) => next,
                None => return,
            };
            let handlers = lock(&self.observers).handlers_for(event.kind());
            for handler in handlers {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
                if let Err(payload) = outcome {
                    error!(
                        timer = %event.timer(),
                        kind = %event.kind(),
                        panic = %panic_message(payload.as_ref()),
                        "Observer panicked."
                    );
                }
            }
            lock(&self.dispatch).delivered = seq;
            self.delivered.notify_all();
        }
    }
}

/// Marks the end of a delivery, however it ends, and wakes the waiters.
struct Delivering<'a> {
    shared: &'a Shared,
}

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        lock(&self.shared.dispatch).deliverer = None;
        self.shared.delivered.notify_all();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl WakeupTarget for Shared {
    fn on_wakeup(&self, generation: u64) -> WakeupOutcome {
        let (outcome, ticket) = {
            let mut guarded = lock(&self.guarded);
            let current = guarded.wakeup.as_ref().map(|wakeup| wakeup.generation);
            if current != Some(generation) {
                trace!(timer = %guarded.core.id, generation, "Ignoring stale wakeup.");
                return WakeupOutcome::Done;
            }
            let now = self.clock.now();
            let step = guarded.core.wakeup(now);
            trace!(
                timer = %guarded.core.id,
                elapsed_ms = guarded.core.total_elapsed_ms(),
                duration_ms = guarded.core.duration_ms(),
                "Wakeup."
            );
            let outcome = match step.driver {
                Some(Driver::Disarm) => {
                    if let Some(wakeup) = guarded.wakeup.take() {
                        wakeup.release();
                    }
                    WakeupOutcome::Done
                }
                Some(Driver::Rearm(period_ms)) => {
                    debug!(
                        timer = %guarded.core.id,
                        period_ms,
                        "Near finish, shortening wakeup interval."
                    );
                    WakeupOutcome::Rearm(Duration::from_millis(period_ms))
                }
                Some(Driver::Arm(_)) | None => WakeupOutcome::Continue,
            };
            if guarded.core.is_finished() {
                info!(
                    timer = %guarded.core.id,
                    duration_ms = guarded.core.duration_ms(),
                    "Timer finished."
                );
            }
            let ticket = self.enqueue(step.events);
            (outcome, ticket)
        };
        self.flush(ticket);
        outcome
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let guarded = self
            .guarded
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        Self::disarm(guarded);
    }
}

// Public API implementation block.
impl CountdownTimer {
    /// Creates a stopped timer with the default settings, wall clock and
    /// process-wide id sequence. See [`TimerBuilder::build`] for a zero
    /// duration.
    pub fn new(duration_ms: u64) -> Self {
        Self::builder(duration_ms).build()
    }

    pub fn builder(duration_ms: u64) -> TimerBuilder {
        TimerBuilder::new(duration_ms)
    }

    fn transition(&self, apply: impl FnOnce(&mut TimerCore, Timestamp) -> Step) {
        let ticket = {
            let mut guarded = lock(&self.shared.guarded);
            let now = self.shared.clock.now();
            let step = apply(&mut guarded.core, now);
            self.shared.commit(&mut guarded, step)
        };
        self.shared.flush(ticket);
    }

    /// Starts or resumes the timer. Does nothing if it is already running
    /// or has finished.
    pub fn start(&self) {
        self.transition(|core, now| {
            let step = core.start(now, None);
            if !step.events.is_empty() {
                debug!(timer = %core.id, elapsed_ms = core.total_elapsed_ms(), "Timer started.");
            }
            step
        });
    }

    /// Forces a (re)start whose current accumulation window began at `at`,
    /// regardless of whether the timer is running or finished.
    pub fn start_at(&self, at: Timestamp) {
        self.transition(|core, now| {
            debug!(timer = %core.id, at, "Timer started at explicit instant.");
            core.start(now, Some(at))
        });
    }

    /// Stops the timer, keeping the time accumulated so far. Does nothing if
    /// it is not running.
    ///
    /// When the time since the last tick brings the timer to its duration,
    /// the elapsed time is clamped and finish observers run after the stop
    /// observers.
    pub fn stop(&self) {
        self.transition(|core, now| {
            let step = core.stop(now);
            if !step.events.is_empty() {
                debug!(timer = %core.id, elapsed_ms = core.total_elapsed_ms(), "Timer stopped.");
            }
            step
        });
    }

    /// Like [`stop`](Self::stop), but fails when there is no armed wakeup
    /// to cancel.
    pub fn try_stop(&self) -> Result<()> {
        let id = {
            let guarded = lock(&self.shared.guarded);
            if guarded.core.wakeup_armed() {
                None
            } else {
                Some(guarded.core.id)
            }
        };
        match id {
            Some(id) => Err(TimerError::WakeupNotActive { id }),
            None => {
                self.stop();
                Ok(())
            }
        }
    }

    /// Cancels any wakeup and returns the timer to zero elapsed time.
    /// Safe from any state; a timer that is already reset is left alone.
    pub fn reset(&self) {
        self.transition(|core, _now| {
            let step = core.reset();
            if !step.events.is_empty() {
                debug!(timer = %core.id, "Timer reset.");
            }
            step
        });
    }

    /// Releases the wakeup and every observer. Nothing is notified, now or
    /// later.
    pub fn destroy(self) {
        {
            let mut guarded = lock(&self.shared.guarded);
            let now = self.shared.clock.now();
            let step = guarded.core.halt(now);
            self.shared.commit(&mut guarded, step);
            debug!(timer = %guarded.core.id, "Timer destroyed.");
        }
        lock(&self.shared.observers).clear();
    }

    /// The accumulated elapsed time as of the last wakeup or stop.
    pub fn time(&self) -> u64 {
        lock(&self.shared.guarded).core.total_elapsed_ms()
    }

    /// The elapsed time right now, including the part of the current
    /// interval not yet folded in by a wakeup.
    pub fn elapsed_now(&self) -> u64 {
        let now = self.shared.clock.now();
        lock(&self.shared.guarded).core.elapsed_at(now)
    }

    pub fn duration(&self) -> u64 {
        lock(&self.shared.guarded).core.duration_ms()
    }

    pub fn remaining(&self) -> u64 {
        let guarded = lock(&self.shared.guarded);
        guarded.core.duration_ms() - guarded.core.total_elapsed_ms()
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.shared.guarded).core.is_finished()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.guarded).core.is_running()
    }

    pub fn id(&self) -> TimerId {
        lock(&self.shared.guarded).core.id
    }

    pub fn label(&self) -> Option<String> {
        lock(&self.shared.guarded).core.label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        lock(&self.shared.guarded).core.label = Some(label.into());
    }

    /// The tick interval used the next time the wakeup is armed.
    pub fn interval(&self) -> u64 {
        lock(&self.shared.guarded).core.tick_interval_ms()
    }

    /// Changes the tick interval for future starts. A running wakeup keeps
    /// its period. Intervals below 1 ms are raised to 1 ms.
    pub fn set_interval(&self, interval_ms: u64) {
        let mut guarded = lock(&self.shared.guarded);
        debug!(timer = %guarded.core.id, interval_ms, "Setting tick interval.");
        guarded.core.set_tick_interval_ms(interval_ms);
    }

    /// Captures a snapshot without affecting the timer.
    pub fn state(&self) -> TimerState {
        lock(&self.shared.guarded).core.snapshot()
    }

    /// Overwrites this timer from a snapshot, cancelling any wakeup first.
    ///
    /// A running snapshot resumes immediately, measured from the snapshot's
    /// `interval_start`; this assumes both timers read the same clock.
    pub fn synchronize(&self, state: &TimerState) {
        self.transition(|core, now| {
            debug!(timer = %core.id, from = %state.id, %state, "Synchronizing.");
            core.restore(state, now)
        });
    }

    /// Alias of [`synchronize`](Self::synchronize).
    pub fn restore_state(&self, state: &TimerState) {
        self.synchronize(state);
    }

    /// Subscribes to the stream of every event this timer emits.
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.shared.event_sender.subscribe()
    }

    /// Registers an observer for one kind of event. Observers of the same
    /// kind fire in registration order.
    pub fn register_callback(
        &self,
        kind: EventKind,
        observer: impl Fn(&TimerEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        lock(&self.shared.observers).insert(kind, Arc::new(observer))
    }

    /// Registers an observer by event name (`start`, `stop`, `finish`,
    /// `tick` or `reset`).
    pub fn register_named(
        &self,
        kind: &str,
        observer: impl Fn(&TimerEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId> {
        let kind: EventKind = kind.parse()?;
        Ok(self.register_callback(kind, observer))
    }

    pub fn on_start(&self, observer: impl Fn() + Send + Sync + 'static) -> ListenerId {
        lock(&self.shared.observers).insert(EventKind::Start, unit_observer(observer))
    }

    pub fn on_stop(&self, observer: impl Fn() + Send + Sync + 'static) -> ListenerId {
        lock(&self.shared.observers).insert(EventKind::Stop, unit_observer(observer))
    }

    pub fn on_finish(&self, observer: impl Fn() + Send + Sync + 'static) -> ListenerId {
        lock(&self.shared.observers).insert(EventKind::Finish, unit_observer(observer))
    }

    pub fn on_reset(&self, observer: impl Fn() + Send + Sync + 'static) -> ListenerId {
        lock(&self.shared.observers).insert(EventKind::Reset, unit_observer(observer))
    }

    /// Registers an observer receiving the elapsed time on every tick.
    pub fn on_tick(&self, observer: impl Fn(u64) + Send + Sync + 'static) -> ListenerId {
        lock(&self.shared.observers).insert(EventKind::Tick, tick_observer(observer))
    }

    /// Returns `true` if the observer was found and removed.
    pub fn remove_callback(&self, id: ListenerId) -> bool {
        lock(&self.shared.observers).remove(id)
    }

    /// Removes every observer.
    pub fn clear_callbacks(&self) {
        debug!(timer = %self.id(), "Clearing callbacks.");
        lock(&self.shared.observers).clear();
    }

    pub fn callback_count(&self) -> usize {
        lock(&self.shared.observers).len()
    }

    /// Registers observers that log every event through `tracing`.
    pub fn trace_events(&self) -> Vec<ListenerId> {
        EventKind::ALL
            .into_iter()
            .map(|kind| self.register_callback(kind, log_event))
            .collect()
    }
}

impl fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CountdownTimer").field(&self.state()).finish()
    }
}

fn log_event(event: &TimerEvent) {
    match *event {
        TimerEvent::Tick { timer, elapsed_ms } => debug!(%timer, elapsed_ms, "tick"),
        TimerEvent::Finished { timer } => info!(%timer, "finish"),
        other => info!(timer = %other.timer(), "{}", other.kind()),
    }
}

fn unit_observer(observer: impl Fn() + Send + Sync + 'static) -> Observer {
    Arc::new(move |_event: &TimerEvent| observer())
}

fn tick_observer(observer: impl Fn(u64) + Send + Sync + 'static) -> Observer {
    Arc::new(move |event: &TimerEvent| {
        if let TimerEvent::Tick { elapsed_ms, .. } = *event {
            observer(elapsed_ms);
        }
    })
}

/// Configures and creates a [`CountdownTimer`].
///
/// # Example
/// ```rust,no_run
/// use countdown::prelude::*;
///
/// # async fn demo() {
/// let timer = CountdownTimer::builder(90_000)
///     .label("white clock")
///     .on_tick(|elapsed| println!("{elapsed} ms"))
///     .on_finish(|| println!("flag fell"))
///     .build();
/// timer.start();
/// # }
/// ```
pub struct TimerBuilder {
    duration_ms: u64,
    label: Option<String>,
    settings: TimerSettings,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    observers: Vec<(EventKind, Observer)>,
}

impl TimerBuilder {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            label: None,
            settings: TimerSettings::default(),
            clock: WallClock::shared(),
            ids: SequentialIds::global(),
            observers: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn settings(mut self, settings: TimerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shorthand for changing only the tick interval.
    pub fn interval(mut self, interval_ms: u64) -> Self {
        self.settings.tick_interval_ms = interval_ms.max(1);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn on(
        mut self,
        kind: EventKind,
        observer: impl Fn(&TimerEvent) + Send + Sync + 'static,
    ) -> Self {
        self.observers.push((kind, Arc::new(observer)));
        self
    }

    pub fn on_start(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.observers.push((EventKind::Start, unit_observer(observer)));
        self
    }

    pub fn on_stop(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.observers.push((EventKind::Stop, unit_observer(observer)));
        self
    }

    pub fn on_finish(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.observers.push((EventKind::Finish, unit_observer(observer)));
        self
    }

    pub fn on_reset(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.observers.push((EventKind::Reset, unit_observer(observer)));
        self
    }

    pub fn on_tick(mut self, observer: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.observers.push((EventKind::Tick, tick_observer(observer)));
        self
    }

    /// Like [`build`](Self::build), but rejects a zero duration.
    pub fn try_build(self) -> Result<CountdownTimer> {
        if self.duration_ms == 0 {
            return Err(TimerError::ZeroDuration);
        }
        Ok(self.build())
    }

    /// Creates the timer. A zero duration is accepted and gives a timer that
    /// is finished before it ever starts; use [`try_build`](Self::try_build)
    /// to reject it.
    pub fn build(self) -> CountdownTimer {
        let mut core = TimerCore::new(self.ids.next_id(), self.duration_ms, self.settings);
        core.label = self.label;
        debug!(timer = %core.id, duration_ms = self.duration_ms, "Initialized.");

        let mut observers = ObserverRegistry::new();
        for (kind, observer) in self.observers {
            observers.insert(kind, observer);
        }
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        CountdownTimer {
            shared: Arc::new(Shared {
                guarded: Mutex::new(Guarded {
                    core,
                    wakeup: None,
                    generation: 0,
                }),
                observers: Mutex::new(observers),
                dispatch: Mutex::new(Dispatch::default()),
                delivered: Condvar::new(),
                event_sender,
                clock: self.clock,
            }),
        }
    }

    /// Builds the timer and immediately overwrites it from `state`. A
    /// running snapshot starts the wakeup, so this needs a Tokio runtime in
    /// that case.
    pub fn restore(self, state: &TimerState) -> CountdownTimer {
        let timer = self.build();
        timer.synchronize(state);
        timer
    }
}
