use anyhow::Result;
use colored::Colorize;
use countdown::prelude::*;
use countdown::{LIBRARY_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");
const SETTINGS_PATH: &str = "countdown.toml";

const LOGO_TEXT: &str = r"
   ___                  _      _
  / __|___ _  _ _ _  __| |_ __| |_____ __ ___ _
 | (__/ _ \ || | ' \/ _` | '_/ _` / _ \ V  V / ' \
  \___\___/\_,_|_||_\__,_|\__\__,_\___/\_/\_/|_||_|
";

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-----------------------------------------------------------------".dimmed());

    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());
    println!("{}", "-----------------------------------------------------------------".dimmed());
}

/// Spawns a task printing the events of one timer. Ticks are printed only
/// while the shared flag is set.
fn spawn_event_listener(handle: usize, timer: &CountdownTimer, show_ticks: Arc<AtomicBool>) {
    let mut events = timer.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TimerEvent::Tick { elapsed_ms, .. } => {
                    if show_ticks.load(Ordering::Relaxed) {
                        println!("<-- [#{handle} TICK] {elapsed_ms} ms");
                    }
                }
                other => println!("\n<-- [#{handle} {}] {:?}\n>> ", other.kind().to_string().to_uppercase(), other),
            }
        }
    });
}

/// The shell's timer table.
struct Session {
    timers: BTreeMap<usize, CountdownTimer>,
    next_handle: usize,
    settings: TimerSettings,
    show_ticks: Arc<AtomicBool>,
}

impl Session {
    fn insert(&mut self, timer: CountdownTimer) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        spawn_event_listener(handle, &timer, self.show_ticks.clone());
        self.timers.insert(handle, timer);
        handle
    }

    fn timer(&self, arg: Option<&&str>) -> Option<&CountdownTimer> {
        let Some(raw) = arg else {
            println!("Error: expected a timer handle. Use 'list' to see timers.");
            return None;
        };
        match raw.trim_start_matches('#').parse::<usize>() {
            Ok(handle) => {
                let timer = self.timers.get(&handle);
                if timer.is_none() {
                    println!("Error: Invalid handle #{}. Use 'list' to see timers.", handle);
                }
                timer
            }
            Err(_) => {
                println!("Error: Handle must be a number (e.g., '0', '1').");
                None
            }
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  new <MS> [LABEL]      - Creates a MS-millisecond timer.");
    println!("  start <H>             - Starts or resumes timer H.");
    println!("  stop <H>              - Stops timer H.");
    println!("  reset <H>             - Resets timer H to zero.");
    println!("  interval <H> <MS>     - Sets the tick interval of H for its next start.");
    println!("  show <H>              - Describes timer H.");
    println!("  state <H>             - Prints the JSON snapshot of H.");
    println!("  clone <H>             - Creates a new timer synchronized to H.");
    println!("  restore <JSON>        - Creates a new timer from a JSON snapshot.");
    println!("  destroy <H>           - Destroys timer H.");
    println!("  list                  - Shows all timers and their handles.");
    println!("  watch on|off          - Toggles printing of tick events.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let settings = match TimerSettings::load(SETTINGS_PATH) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Ignoring {}: {}", SETTINGS_PATH, e);
            TimerSettings::default()
        }
    };
    info!(?settings, "{} shell ready.", LIBRARY_NAME.cyan());

    let mut session = Session {
        timers: BTreeMap::new(),
        next_handle: 0,
        settings,
        show_ticks: Arc::new(AtomicBool::new(false)),
    };

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} shell is running. Type 'help' for commands or 'exit' to quit.", LIBRARY_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.trim().split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "new" => {
                            if let Some(ms_str) = args.get(1) {
                                if let Ok(duration_ms) = ms_str.parse::<u64>() {
                                    let mut builder = CountdownTimer::builder(duration_ms)
                                        .settings(session.settings.clone());
                                    if args.len() > 2 {
                                        builder = builder.label(args[2..].join(" "));
                                    }
                                    match builder.try_build() {
                                        Ok(timer) => {
                                            let id = timer.id();
                                            let handle = session.insert(timer);
                                            println!("--> Created {} ({} ms) with handle: #{}", id, duration_ms, handle);
                                        }
                                        Err(e) => println!("Error: {}", e),
                                    }
                                } else {
                                    println!("Error: '{}' is not a valid number of milliseconds.", ms_str);
                                }
                            } else {
                                println!("Usage: new <MS> [LABEL]");
                            }
                        }
                        "start" => {
                            if let Some(timer) = session.timer(args.get(1)) {
                                timer.start();
                            }
                        }
                        "stop" => {
                            if let Some(timer) = session.timer(args.get(1)) {
                                if let Err(e) = timer.try_stop() {
                                    println!("--> {}", e);
                                }
                            }
                        }
                        "reset" => {
                            if let Some(timer) = session.timer(args.get(1)) {
                                timer.reset();
                            }
                        }
                        "interval" => {
                            if let Some(timer) = session.timer(args.get(1)) {
                                match args.get(2).map(|ms| ms.parse::<u64>()) {
                                    Some(Ok(ms)) => {
                                        timer.set_interval(ms);
                                        println!("--> Tick interval is now {} ms.", timer.interval());
                                    }
                                    _ => println!("Usage: interval <H> <MS>"),
                                }
                            }
                        }
                        "show" => {
                            if let Some(timer) = session.timer(args.get(1)) {
                                let state = timer.state();
                                println!(
                                    "--> {} {} (live {} ms, finished={})",
                                    state.id,
                                    state,
                                    timer.elapsed_now(),
                                    state.is_finished()
                                );
                            }
                        }
                        "state" => {
                            if let Some(timer) = session.timer(args.get(1)) {
                                match serde_json::to_string(&timer.state()) {
                                    Ok(json) => println!("{}", json),
                                    Err(e) => println!("Error: {}", e),
                                }
                            }
                        }
                        "clone" => {
                            if let Some(state) = session.timer(args.get(1)).map(CountdownTimer::state) {
                                let timer = CountdownTimer::builder(state.duration_ms)
                                    .settings(session.settings.clone())
                                    .restore(&state);
                                let handle = session.insert(timer);
                                println!("--> Synchronized copy of {} created with handle: #{}", state.id, handle);
                            }
                        }
                        "restore" => {
                            let json = args[1..].join(" ");
                            match serde_json::from_str::<TimerState>(&json) {
                                Ok(state) => {
                                    let timer = CountdownTimer::builder(state.duration_ms)
                                        .settings(session.settings.clone())
                                        .restore(&state);
                                    let handle = session.insert(timer);
                                    println!("--> Restored {} with handle: #{}", state.id, handle);
                                }
                                Err(e) => println!("Error: not a timer snapshot: {}", e),
                            }
                        }
                        "destroy" => {
                            let handle = args
                                .get(1)
                                .and_then(|raw| raw.trim_start_matches('#').parse::<usize>().ok());
                            match handle.and_then(|handle| session.timers.remove(&handle)) {
                                Some(timer) => {
                                    timer.destroy();
                                    println!("--> Timer destroyed.");
                                }
                                None => println!("Usage: destroy <H>. Use 'list' to see timers."),
                            }
                        }
                        "list" => {
                            println!("Timers:");
                            for (handle, timer) in &session.timers {
                                let state = timer.state();
                                let label = state.label.as_deref().unwrap_or("-");
                                println!("  Handle #{}: {} '{}' {}", handle, state.id, label, state);
                            }
                        }
                        "watch" => match args.get(1) {
                            Some(&"on") => {
                                session.show_ticks.store(true, Ordering::Relaxed);
                                println!("--> Printing tick events.");
                            }
                            Some(&"off") => {
                                session.show_ticks.store(false, Ordering::Relaxed);
                                println!("--> Stopped printing tick events.");
                            }
                            _ => println!("Usage: watch on|off"),
                        },
                        "help" => print_help(),
                        "exit" => break,
                        "" => {}
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting countdown shell...");
                break;
            }
        }
    }

    Ok(())
}
