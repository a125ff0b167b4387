//! Error types for garden-core.
//!
//! Every failure in the dashboard core is caught at a component boundary and
//! turned into a status change or a notice; none of these errors is allowed
//! to end the session.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`ConfigError`](crate::config::ConfigError) | session start | unavailable notice, status `Disconnected` |
//! | [`ConnectError`] | [`connect_transport`](crate::connect_transport) | unavailable notice, status `Disconnected` until restart |
//! | [`TransportError`] | a single fetch or subscribe | status degrades, next cycle retries |
//! | [`DecodeError`] | payload decoding | payload dropped, logged, counted |
//! | [`SendError`] | command dispatch | persistent error notice, no retry |

use std::time::Duration;

use thiserror::Error;

use garden_types::{DecodeError, Mode, OutboundCommand};

use crate::dispatch::ActionId;

/// Failure to establish a transport at startup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The connection string or broker URL could not be understood.
    #[error("Invalid connection address '{address}': {reason}")]
    InvalidAddress {
        /// The address as configured.
        address: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The record store could not be opened or did not answer.
    #[error("Record store unavailable: {0}")]
    Store(#[from] garden_store::Error),

    /// The broker refused the connection.
    #[error("Broker refused connection (return code {code}: {})", describe_return_code(*.code))]
    Refused {
        /// The broker-reported connect return code.
        code: u8,
    },

    /// The store or broker could not be reached.
    #[error("Connection failed: {0}")]
    Unreachable(String),

    /// No answer within the connect timeout.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of a single fetch or subscribe operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport is not ready (not yet subscribed, or the link is down).
    #[error("Transport not connected")]
    NotConnected,

    /// The transport has been closed.
    #[error("Transport closed")]
    Closed,

    /// The operation did not finish in time.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The stored record could not be decoded.
    #[error("Malformed status record: {0}")]
    Decode(#[from] DecodeError),

    /// The record store failed.
    #[error("Record store error: {0}")]
    Store(#[from] garden_store::Error),

    /// The broker client failed.
    #[error("Broker error: {0}")]
    Broker(String),

    /// A background task stopped unexpectedly.
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Failure to dispatch a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SendError {
    /// A pump command was attempted while the device is not in manual mode.
    #[error("{command} is only available in MANUAL mode (current mode: {mode})")]
    ModeRestricted {
        /// The rejected command.
        command: OutboundCommand,
        /// The mode shown at the time.
        mode: Mode,
    },

    /// No live transport to send through.
    #[error("Not connected to the device")]
    Disconnected,

    /// The user action was already handled.
    #[error("Action {0} was already handled")]
    Duplicate(ActionId),

    /// The transport did not accept the command in time.
    #[error("Sending timed out after {0:?}")]
    Timeout(Duration),

    /// The transport rejected the command.
    #[error("Send failed: {0}")]
    Transport(String),
}

impl SendError {
    /// Whether the command was rejected locally without a transport call.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::ModeRestricted { .. } | Self::Disconnected | Self::Duplicate(_)
        )
    }
}

impl TransportError {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: &'static str, duration: Duration) -> Self {
        Self::Timeout {
            operation,
            duration,
        }
    }
}

/// Human-readable meaning of an MQTT 3.1.1 connect return code.
pub fn describe_return_code(code: u8) -> &'static str {
    match code {
        0 => "accepted",
        1 => "unacceptable protocol version",
        2 => "identifier rejected",
        3 => "server unavailable",
        4 => "bad user name or password",
        5 => "not authorized",
        _ => "unknown",
    }
}
