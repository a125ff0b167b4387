//! Watch command implementation.
//!
//! Runs the refresh cycle until interrupted. Commands typed on stdin (`on`,
//! `off`, `mode`) are queued as user actions and sent on the next cycle.

use std::io::{self, BufRead, IsTerminal};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_core::{ActionSender, Config, Control, RefreshScheduler};

use crate::format::{FormatOptions, TextRenderer};
use crate::util::open_session;

/// Arguments for the watch command.
pub struct WatchArgs {
    pub interval: Option<u64>,
    pub no_input: bool,
    pub opts: FormatOptions,
}

/// What one line of operator input asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Nothing,
    Quit,
    Control(Control),
    Unknown,
}

fn parse_input(line: &str) -> Input {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Input::Nothing,
        "q" | "quit" | "exit" => Input::Quit,
        other => other.parse().map(Input::Control).unwrap_or(Input::Unknown),
    }
}

pub async fn cmd_watch(loaded: Result<Config>, args: WatchArgs) -> Result<()> {
    let loaded = loaded.map(|mut config| {
        if let Some(interval) = args.interval {
            config.refresh.interval = interval;
        }
        config
    });

    let mut session = open_session(loaded).await;
    let cancel = session.cancel_token();

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                cancel.cancel();
            }
        })
    };

    if !args.no_input {
        spawn_input_reader(session.actions(), cancel.clone());
    }

    let stdout = io::stdout();
    let clear = stdout.is_terminal();
    let mut renderer = TextRenderer::new(stdout, args.opts, clear);
    let mut scheduler = RefreshScheduler::for_session(&session);
    scheduler.run(&mut session, &mut renderer).await;

    session.shutdown().await;
    interrupt.abort();
    debug!("Watch ended after {} cycles", scheduler.cycles());
    Ok(())
}

/// Read operator input on a plain thread.
///
/// Stdin reads block, so they stay off the runtime. The thread is left to
/// die with the process.
fn spawn_input_reader(actions: ActionSender, cancel: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("garden-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if cancel.is_cancelled() {
                    break;
                }
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        break;
                    }
                };
                match parse_input(&line) {
                    Input::Nothing => {}
                    Input::Quit => {
                        cancel.cancel();
                        break;
                    }
                    Input::Control(control) => match actions.send(control) {
                        Some(id) => debug!("Queued {} as {}", control.label(), id),
                        None => warn!("Dropped {}: too many pending actions", control.label()),
                    },
                    Input::Unknown => {
                        eprintln!("Unknown command '{}' (expected on, off, mode or q)", line.trim())
                    }
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Input disabled: {}", e);
    }
}
