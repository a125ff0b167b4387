//! Command-line dashboard for the smart garden controller.
//!
//! The `garden` binary shows the controller's live state in a terminal and
//! sends pump and mode commands back to it, over either a record store or an
//! MQTT broker.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `watch` | Live dashboard; type `on`, `off` or `mode` to send commands |
//! | `status` | Print the current state once (text or JSON) |
//! | `send` | Send one command |
//! | `video-url` | Print the camera feed URL |
//! | `config` | Show, locate, create or validate the configuration |
//!
//! # Configuration
//!
//! Settings are read from `dashboard.toml` in the platform config directory
//! (`~/.config/garden/dashboard.toml` on Linux), then overridden by
//! environment variables, then by flags.
//!
//! # Environment Variables
//!
//! - `GARDEN_CONFIG`: Configuration file path
//! - `GARDEN_TRANSPORT`, `GARDEN_STORE_URL`, `GARDEN_BROKER`, `GARDEN_DEVICE_ID`: Connection settings
//! - `STREAM_HOST`: Host serving the camera feed
//! - `NO_COLOR`: Disable colored output when set
//!
//! # Examples
//!
//! Watch a controller over MQTT:
//! ```bash
//! garden --transport mqtt --broker wss://broker.example.com:8884/mqtt watch
//! ```
//!
//! Turn the pump on (the controller must be in manual mode):
//! ```bash
//! garden send on
//! ```
//!
//! Print the state as JSON:
//! ```bash
//! garden status --format json
//! ```

// The binary lives in main.rs; the library only re-exports the crates it
// is built on.
pub use garden_core;
pub use garden_types;
