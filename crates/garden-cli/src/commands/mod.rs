//! Command implementations for the CLI.

mod config;
mod send;
mod status;
mod video;
mod watch;

pub use config::cmd_config;
pub use send::cmd_send;
pub use status::cmd_status;
pub use video::cmd_video_url;
pub use watch::{WatchArgs, cmd_watch};
