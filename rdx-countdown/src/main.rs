use anyhow::{Context, Result};
use countdown::prelude::*;
use std::env;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_DURATION_MS: u64 = 5000;
const DEFAULT_SETTINGS_PATH: &str = "countdown.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Read the duration and an optional settings file from the command line.
    let mut args = env::args().skip(1);
    let duration_ms = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("'{raw}' is not a duration in milliseconds"))?,
        None => DEFAULT_DURATION_MS,
    };
    let settings_path = args.next().unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = TimerSettings::load(&settings_path)
        .with_context(|| format!("failed to load settings from {settings_path}"))?;
    info!(?settings, "Loaded settings.");

    // 3. Create the timer and log everything it does.
    let timer = CountdownTimer::builder(duration_ms)
        .label("dev")
        .settings(settings)
        .try_build()?;
    timer.trace_events();
    let mut events = timer.subscribe();

    // 4. Run it until it finishes or Ctrl+C stops it early.
    timer.start();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TimerEvent::Finished { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "Event stream lagged."),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received.");
                timer.stop();
                break;
            }
        }
    }

    info!(state = %timer.state(), "Final state.");
    Ok(())
}
