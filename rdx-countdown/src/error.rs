//! The error type shared by the whole crate.

use crate::common::TimerId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimerError {
    /// An observer was addressed by a name that is not one of
    /// `start`, `stop`, `finish`, `tick` or `reset`.
    #[error("invalid event kind '{0}'; expected one of: start, stop, finish, tick, reset")]
    InvalidEventKind(String),

    /// The strict stop path found no armed wakeup to cancel.
    #[error("{id} has no active wakeup to cancel")]
    WakeupNotActive { id: TimerId },

    /// A timer was built with a zero duration.
    #[error("timer duration must be positive")]
    ZeroDuration,

    #[error("invalid timer settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T, E = TimerError> = std::result::Result<T, E>;
