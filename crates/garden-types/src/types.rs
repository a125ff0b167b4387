//! Core types for garden controller data.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;

use crate::error::DecodeError;
use crate::patch::SnapshotPatch;

/// Operating mode reported by the controller.
///
/// The controller reports its mode as a lowercase string. Anything other than
/// `auto` or `manual` is kept as [`Mode::Unknown`] instead of failing the whole
/// payload, so a firmware that grows a new mode still renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// The controller waters on its own schedule.
    Auto,
    /// The pump only follows operator commands.
    Manual,
    /// Mode string not recognized.
    #[default]
    Unknown,
}

impl Mode {
    /// Parse the wire representation (case-insensitive).
    ///
    /// ```
    /// use garden_types::Mode;
    ///
    /// assert_eq!(Mode::from_wire("manual"), Mode::Manual);
    /// assert_eq!(Mode::from_wire(" AUTO "), Mode::Auto);
    /// assert_eq!(Mode::from_wire("eco"), Mode::Unknown);
    /// ```
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            Mode::Auto
        } else if value.eq_ignore_ascii_case("manual") {
            Mode::Manual
        } else {
            Mode::Unknown
        }
    }

    /// The wire representation written by the controller.
    #[must_use]
    pub fn as_wire(&self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Manual => "manual",
            Mode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "AUTO"),
            Mode::Manual => write!(f, "MANUAL"),
            Mode::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Mode::from_wire(&value))
    }
}

/// A command token sent from the dashboard to the controller.
///
/// Commands carry no payload and no identifier; the controller acts on the
/// token and the effect shows up in a later status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundCommand {
    /// Switch the pump on (manual mode only).
    PumpOn,
    /// Switch the pump off (manual mode only).
    PumpOff,
    /// Flip between automatic and manual mode.
    ToggleMode,
    /// Flip the pump state (manual mode only).
    TogglePump,
}

impl OutboundCommand {
    /// Every command the protocol knows.
    pub const ALL: [OutboundCommand; 4] = [
        OutboundCommand::PumpOn,
        OutboundCommand::PumpOff,
        OutboundCommand::ToggleMode,
        OutboundCommand::TogglePump,
    ];

    /// The token as it travels on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundCommand::PumpOn => "PUMP_ON",
            OutboundCommand::PumpOff => "PUMP_OFF",
            OutboundCommand::ToggleMode => "TOGGLE_MODE",
            OutboundCommand::TogglePump => "TOGGLE_PUMP",
        }
    }

    /// Whether the controller only honours this command in [`Mode::Manual`].
    ///
    /// ```
    /// use garden_types::OutboundCommand;
    ///
    /// assert!(OutboundCommand::PumpOn.requires_manual_mode());
    /// assert!(!OutboundCommand::ToggleMode.requires_manual_mode());
    /// ```
    #[must_use]
    pub fn requires_manual_mode(&self) -> bool {
        matches!(
            self,
            OutboundCommand::PumpOn | OutboundCommand::PumpOff | OutboundCommand::TogglePump
        )
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboundCommand {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        OutboundCommand::ALL
            .into_iter()
            .find(|cmd| cmd.as_str().eq_ignore_ascii_case(token))
            .ok_or_else(|| DecodeError::UnknownCommand(token.to_string()))
    }
}

impl Serialize for OutboundCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Connection state shown to the operator.
///
/// Never stored directly; always derived from transport liveness and whether
/// any data has arrived. See [`ConnectionStatus::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Transport is live and at least one non-empty snapshot has arrived.
    ConnectedWithData,
    /// Transport is live but the device has not reported anything yet.
    ConnectedNoData,
    /// No transport handle, or the last transport operation failed.
    Disconnected,
}

impl ConnectionStatus {
    /// Derive the status from the transport link and data state.
    ///
    /// ```
    /// use garden_types::ConnectionStatus;
    ///
    /// assert_eq!(ConnectionStatus::derive(false, false, true), ConnectionStatus::Disconnected);
    /// assert_eq!(ConnectionStatus::derive(true, true, true), ConnectionStatus::Disconnected);
    /// assert_eq!(ConnectionStatus::derive(true, false, false), ConnectionStatus::ConnectedNoData);
    /// assert_eq!(ConnectionStatus::derive(true, false, true), ConnectionStatus::ConnectedWithData);
    /// ```
    #[must_use]
    pub fn derive(attached: bool, last_op_failed: bool, has_data: bool) -> Self {
        if !attached || last_op_failed {
            ConnectionStatus::Disconnected
        } else if has_data {
            ConnectionStatus::ConnectedWithData
        } else {
            ConnectionStatus::ConnectedNoData
        }
    }

    /// Whether the transport is usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionStatus::Disconnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::ConnectedWithData => write!(f, "Connected"),
            ConnectionStatus::ConnectedNoData => write!(f, "Connected, no data yet"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// The last known state of the controller.
///
/// Every field is optional: a freshly provisioned controller reports nothing
/// and that is a valid snapshot. Serialization omits absent fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotPatch")]
pub struct DeviceSnapshot {
    /// Operating mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Whether the pump is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pump_on: Option<bool>,
    /// Air temperature in degrees Celsius.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_temp: Option<f64>,
    /// Relative air humidity in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_humidity: Option<f64>,
    /// Illuminance in lux.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_lux: Option<f64>,
    /// Soil moisture in raw ADC units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<i64>,
    /// Water tank level in raw ADC units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_level: Option<i64>,
    /// Fingers counted by the camera's gesture recognizer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finger_count: Option<i64>,
    /// When the camera last saw motion.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::codec::wire_time::serialize_option"
    )]
    pub last_motion_time: Option<OffsetDateTime>,
    /// City used for the forecast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Daily forecast text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_description: Option<String>,
    /// Camera stream published by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_stream_url: Option<String>,
    /// Command currently staged in the record's mailbox field.
    ///
    /// Kept as the raw token: the controller may clear or rewrite it with
    /// values the dashboard does not send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl DeviceSnapshot {
    /// Whether every field is absent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == DeviceSnapshot::default()
    }

    /// Merge a partial update into this snapshot.
    ///
    /// Only fields present in the patch are written; a field present as
    /// `null` clears the stored value.
    pub fn merge(&mut self, patch: &SnapshotPatch) {
        patch.apply_to(self);
    }

    /// Whether the pump controls are usable, i.e. the controller is in manual mode.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.mode == Some(Mode::Manual)
    }

    /// The staged mailbox command, if it is a protocol token.
    #[must_use]
    pub fn staged_command(&self) -> Option<OutboundCommand> {
        self.command.as_deref().and_then(|s| s.parse().ok())
    }
}

impl From<SnapshotPatch> for DeviceSnapshot {
    fn from(patch: SnapshotPatch) -> Self {
        let mut snapshot = DeviceSnapshot::default();
        snapshot.merge(&patch);
        snapshot
    }
}
