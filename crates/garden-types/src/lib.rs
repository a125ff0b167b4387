//! Platform-agnostic types for the smart garden controller dashboard.
//!
//! This crate provides the data model shared by the record store, the
//! transports and the dashboard core.
//!
//! # Features
//!
//! - [`DeviceSnapshot`]: the last known controller state, every field optional
//! - [`SnapshotPatch`]: a partial update with per-field absent/null/value semantics
//! - [`OutboundCommand`]: the command tokens understood by the controller
//! - [`ConnectionStatus`]: the derived connection indicator
//! - JSON wire codec shared by records and telemetry frames
//!
//! # Example
//!
//! ```
//! use garden_types::{decode_patch, DeviceSnapshot, Mode};
//!
//! let mut snapshot = DeviceSnapshot::default();
//! snapshot.merge(&decode_patch(br#"{"mode": "auto", "soil_moisture": 430}"#)?);
//! snapshot.merge(&decode_patch(br#"{"soil_moisture": 410}"#)?);
//!
//! assert_eq!(snapshot.mode, Some(Mode::Auto));
//! assert_eq!(snapshot.soil_moisture, Some(410));
//! # Ok::<(), garden_types::DecodeError>(())
//! ```

pub mod codec;
pub mod error;
pub mod patch;
pub mod types;

pub use codec::{decode_patch, decode_snapshot, encode_patch, encode_snapshot, patch_from_value};
pub use error::{DecodeError, DecodeResult};
pub use patch::{Field, SnapshotPatch};
pub use types::{ConnectionStatus, DeviceSnapshot, Mode, OutboundCommand};
