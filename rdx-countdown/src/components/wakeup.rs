//! The periodic wakeup that drives a running timer.
//!
//! A wakeup is a Tokio task ticking at a fixed period. It holds only a weak
//! reference to its target, so dropping the timer ends the task, and every
//! wakeup carries a generation number that the target checks under its lock
//! before acting. A wakeup that has been superseded or cancelled therefore
//! never advances the timer, even if its task was already scheduled.

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::trace;

/// What the wakeup task should do after notifying its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeupOutcome {
    Continue,
    /// Keep running, but at a new period starting now.
    Rearm(Duration),
    Done,
}

/// Receives the periodic wakeups.
pub(crate) trait WakeupTarget: Send + Sync + 'static {
    fn on_wakeup(&self, generation: u64) -> WakeupOutcome;
}

/// The one armed wakeup of a timer.
pub(crate) struct Wakeup {
    pub generation: u64,
    handle: JoinHandle<()>,
}

impl Wakeup {
    /// Spawns the wakeup task. The first wakeup fires one `period` from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn arm<T: WakeupTarget>(target: Weak<T>, generation: u64, period: Duration) -> Self {
        let first = Instant::now() + period;
        let handle = tokio::spawn(drive(target, generation, first, period));
        Self { generation, handle }
    }

    /// Aborts the task. Used when cancelling from outside the task.
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }

    /// Forgets the task without aborting it. Used when the task itself
    /// decided to stop and is about to return.
    pub(crate) fn release(self) {
        drop(self.handle);
    }
}

async fn drive<T: WakeupTarget>(
    target: Weak<T>,
    generation: u64,
    first: Instant,
    period: Duration,
) {
    let mut ticker = interval_at(first, period);
    loop {
        ticker.tick().await;
        let Some(target) = target.upgrade() else {
            trace!(generation, "Wakeup target dropped.");
            break;
        };
        match target.on_wakeup(generation) {
            WakeupOutcome::Continue => {}
            WakeupOutcome::Rearm(period) => {
                trace!(generation, ?period, "Re-arming wakeup.");
                ticker = interval_at(Instant::now() + period, period);
            }
            WakeupOutcome::Done => break,
        }
    }
}
