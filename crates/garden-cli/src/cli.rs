//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use garden_core::{Backend, Control};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Overrides for the connection settings in the config file
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// Transport to use (store or mqtt)
    #[arg(long, value_parser = parse_backend)]
    pub transport: Option<Backend>,

    /// Record store connection string (database path or sqlite:// URL)
    #[arg(long)]
    pub store_url: Option<String>,

    /// MQTT broker URL (mqtt://, mqtts://, ws:// or wss://)
    #[arg(long)]
    pub broker: Option<String>,

    /// Identifier of the status record
    #[arg(long)]
    pub device_id: Option<String>,

    /// Host serving the camera feed
    #[arg(long)]
    pub stream_host: Option<String>,
}

#[derive(Parser)]
#[command(name = "garden")]
#[command(author, version, about = "Dashboard for the smart garden controller", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "GARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Live dashboard; type on, off or mode to send commands
    Watch {
        /// Refresh interval in seconds (pull transport)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=300))]
        interval: Option<u64>,

        /// Do not read commands from stdin
        #[arg(long)]
        no_input: bool,
    },

    /// Print the current device state once
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Seconds to wait for pushed data
        #[arg(short, long, default_value = "5")]
        wait: u64,
    },

    /// Send one command to the controller
    Send {
        /// Control to activate
        #[arg(value_enum)]
        control: ControlArg,

        /// Seconds to wait for the device state before sending
        #[arg(short, long, default_value = "5")]
        wait: u64,
    },

    /// Print the camera feed URL
    VideoUrl {
        /// Seconds to wait for pushed data
        #[arg(short, long, default_value = "5")]
        wait: u64,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Controls that can be sent from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ControlArg {
    /// Turn the pump on (manual mode only)
    On,
    /// Turn the pump off (manual mode only)
    Off,
    /// Switch between automatic and manual mode
    Mode,
}

impl From<ControlArg> for Control {
    fn from(arg: ControlArg) -> Self {
        match arg {
            ControlArg::On => Control::PumpOn,
            ControlArg::Off => Control::PumpOff,
            ControlArg::Mode => Control::ToggleMode,
        }
    }
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check the configuration and report problems
    Validate,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse::<Backend>().map_err(|e| e.to_string())
}
