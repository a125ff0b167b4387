//! Status synchronization and command dispatch for the smart garden dashboard.
//!
//! This crate keeps a displayed snapshot of a remote garden controller
//! consistent with what the controller reports, and turns operator input into
//! commands sent back to it.
//!
//! # Features
//!
//! - **Two transports**: poll a record store ([`RecordTransport`]) or keep an
//!   MQTT subscription ([`MqttTransport`]), selected by configuration
//! - **Field-level merging**: partial telemetry frames only overwrite the
//!   fields they carry
//! - **Guarded commands**: pump commands are refused locally outside manual
//!   mode, and each user action is sent at most once
//! - **Degrade, never crash**: configuration and connection problems become a
//!   `Disconnected` status and an on-screen notice
//!
//! # Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Transport`] | fetches or receives device state, publishes commands |
//! | [`StateStore`] | owns the snapshot and derives the [`ConnectionStatus`](garden_types::ConnectionStatus) |
//! | [`CommandDispatcher`] | mode and connection guards, send timeout, notices |
//! | [`RefreshScheduler`] | sync, render, dispatch, wait; repeat |
//! | [`Session`] | ties one operator view together |
//!
//! # Quick Start
//!
//! ```no_run
//! use garden_core::{Config, Frame, RefreshScheduler, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default()?;
//!     let mut session = Session::start(config).await;
//!
//!     let mut scheduler = RefreshScheduler::for_session(&session);
//!     let mut renderer = |frame: &Frame| println!("{}", frame.view.status);
//!     scheduler.run(&mut session, &mut renderer).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod mock;
pub mod notice;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod transport;
pub mod video;

pub use config::{Backend, Config, ConfigError, ValidationError, default_config_path};
pub use diagnostics::{Diagnostics, DiagnosticsReport};
pub use dispatch::{Ack, ActionId, ActionSender, CommandDispatcher, Control, UserAction};
pub use error::{ConnectError, SendError, TransportError};
pub use mock::MockTransport;
pub use notice::{Notice, NoticeLevel, Notices};
pub use render::{Frame, Render};
pub use scheduler::{RefreshScheduler, SchedulerState, Wake, WakePolicy};
pub use session::Session;
pub use state::{StateStore, StateView};
pub use transport::{
    MqttTransport, RecordTransport, Transport, TransportEvent, TransportKind, UpdateStream,
    connect_transport,
};
pub use video::resolve_video_url;

// Re-export the data model
pub use garden_types::{
    ConnectionStatus, DecodeError, DeviceSnapshot, Mode, OutboundCommand, SnapshotPatch,
};
