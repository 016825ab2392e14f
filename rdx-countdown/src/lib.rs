//! # Countdown
//!
//! A resumable, serializable countdown timer for Tokio applications.
//!
//! A timer is given a duration and tracks running time against it. It can be
//! started, stopped and reset any number of times, accumulating only the time
//! it actually ran, and it notifies observers as it goes. It is meant as a
//! building block for game clocks, session timers and the like.
//!
//! ## Core Concepts
//!
//! - **Accumulation**: Elapsed time is summed across start/stop cycles and is
//!   clamped to the duration exactly when the timer finishes.
//! - **Wakeups**: While running, a Tokio task wakes the timer every tick
//!   interval (200 ms by default) to advance it and fire `tick`.
//! - **Observers**: Closures registered per `EventKind` (`start`, `stop`,
//!   `tick`, `finish`, `reset`) fire in registration order. Every event is
//!   also broadcast to every `subscribe()` receiver.
//! - **Synchronization**: `state()` captures a serde-serializable
//!   `TimerState`; `synchronize()` reproduces it in another timer, resuming a
//!   running timer without losing elapsed time.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use countdown::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Create a one-second timer that reports its progress.
//!     let timer = CountdownTimer::builder(1000)
//!         .on_tick(|elapsed| println!("{elapsed} ms elapsed"))
//!         .on_finish(|| println!("done"))
//!         .build();
//!
//!     // 2. Run it to completion.
//!     timer.start();
//!     tokio::time::sleep(Duration::from_millis(1100)).await;
//!     assert!(timer.is_finished());
//!     assert_eq!(timer.time(), 1000);
//!
//!     // 3. Copy its state into a second timer.
//!     let copy = CountdownTimer::new(1);
//!     copy.synchronize(&timer.state());
//!     assert_eq!(copy.state(), timer.state());
//!     Ok(())
//! }
//! ```

pub const LIBRARY_NAME: &str = "Countdown";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


// Declare all the modules in the crate.
pub mod common;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
mod machine;
pub mod state;
pub mod time;
pub mod timer;

/// A prelude module for easy importing of the most common Countdown types.
pub mod prelude {
    pub use crate::common::{IdGenerator, ListenerId, SequentialIds, TimerId};
    pub use crate::config::TimerSettings;
    pub use crate::error::TimerError;
    pub use crate::events::{EventKind, TimerEvent};
    pub use crate::state::{Action, TimerState};
    pub use crate::time::{Clock, Timestamp, TokioClock, WallClock};
    pub use crate::timer::{CountdownTimer, TimerBuilder};
}
