//! Defines the configuration for countdown timers.
//!
//! `TimerSettings` is designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, layered under `COUNTDOWN_*` environment
//! variables. Every field has a default, so an empty or missing file yields
//! the stock behavior.

use crate::error::{Result, TimerError};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Per-timer wakeup settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// How often a running timer wakes up to advance and fire `tick`.
    pub tick_interval_ms: u64,

    /// When true, a wakeup that finds less than one period left re-arms at
    /// `minimum_interval_ms` so the finish is detected closer to on time.
    pub adjust_interval_near_finish: bool,

    /// The period used by the near-finish adjustment.
    pub minimum_interval_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            adjust_interval_near_finish: false,
            minimum_interval_ms: 20,
        }
    }
}

impl TimerSettings {
    /// Loads settings from an optional TOML file, then applies
    /// `COUNTDOWN_*` environment overrides
    /// (e.g. `COUNTDOWN_TICK_INTERVAL_MS=50`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings: TimerSettings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("COUNTDOWN").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()
    }

    /// Parses settings from a TOML document.
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings: TimerSettings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.tick_interval_ms == 0 {
            return Err(TimerError::InvalidSettings(
                "tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.minimum_interval_ms == 0 {
            return Err(TimerError::InvalidSettings(
                "minimum_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_timer() {
        let settings = TimerSettings::default();
        assert_eq!(settings.tick_interval_ms, 200);
        assert!(!settings.adjust_interval_near_finish);
        assert_eq!(settings.minimum_interval_ms, 20);
        assert_eq!(settings.tick_interval(), Duration::from_millis(200));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = TimerSettings::from_toml("tick_interval_ms = 50").unwrap();
        assert_eq!(settings.tick_interval_ms, 50);
        assert_eq!(settings.minimum_interval_ms, 20);
    }

    #[test]
    fn full_toml_overrides_everything() {
        let settings = TimerSettings::from_toml(
            "tick_interval_ms = 500\nadjust_interval_near_finish = true\nminimum_interval_ms = 10",
        )
        .unwrap();
        assert_eq!(
            settings,
            TimerSettings {
                tick_interval_ms: 500,
                adjust_interval_near_finish: true,
                minimum_interval_ms: 10,
            }
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = TimerSettings::from_toml("tick_interval_ms = 0").unwrap_err();
        assert!(matches!(err, TimerError::InvalidSettings(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("rdx-countdown-no-such-settings.toml");
        let settings = TimerSettings::load(&path).unwrap();
        assert_eq!(settings.minimum_interval_ms, 20);
    }
}
