use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod format;
mod style;
mod util;

use cli::{Cli, Commands, ConfigAction};
use commands::{WatchArgs, cmd_config, cmd_send, cmd_status, cmd_video_url, cmd_watch};
use format::FormatOptions;
use garden_core::Config;
use util::{config_path, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so the dashboard and JSON output stay clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let opts = FormatOptions::new(cli.no_color);
    let path = config_path(&cli);
    let loaded = load_config(&cli);

    match cli.command {
        Commands::Watch { interval, no_input } => {
            cmd_watch(
                loaded,
                WatchArgs {
                    interval,
                    no_input,
                    opts,
                },
            )
            .await?;
        }
        Commands::Status { format, wait } => {
            cmd_status(loaded, format, Duration::from_secs(wait), &opts).await?;
        }
        Commands::Send { control, wait } => {
            cmd_send(loaded?, control.into(), Duration::from_secs(wait), &opts).await?;
        }
        Commands::VideoUrl { wait } => {
            cmd_video_url(loaded, Duration::from_secs(wait), &opts).await?;
        }
        Commands::Config { action } => {
            // path and init work even when the current file does not load
            let config = match action {
                ConfigAction::Show | ConfigAction::Validate => loaded?,
                ConfigAction::Path | ConfigAction::Init { .. } => Config::default(),
            };
            cmd_config(action, &path, &config, &opts)?;
        }
    }

    Ok(())
}
