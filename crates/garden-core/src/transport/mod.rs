//! Transports to the garden controller.
//!
//! Two transports exist, selected by configuration:
//!
//! - [`RecordTransport`] (pull): reads the controller's status record from the
//!   record store on every refresh and stages commands in its `command` key.
//! - [`MqttTransport`] (push): keeps a subscription to the status topic and
//!   delivers partial frames through an [`UpdateStream`]; commands go to a
//!   separate topic.
//!
//! Both are used through the [`Transport`] trait.

pub mod mqtt;
pub mod pull;
mod stream;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use garden_types::{DeviceSnapshot, OutboundCommand, SnapshotPatch};

use crate::config::{Backend, TimeoutConfig, TransportConfig};
use crate::diagnostics::Diagnostics;
use crate::error::{ConnectError, SendError, TransportError};

pub use mqtt::{BrokerAddress, BrokerScheme, MqttTransport};
pub use pull::RecordTransport;
pub use stream::{UPDATE_CHANNEL_CAPACITY, UpdateStream};

/// How a transport delivers device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// The dashboard fetches the full record on each refresh.
    Pull,
    /// The device pushes partial frames as they happen.
    Push,
}

/// Something a push transport reports from its background task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Subscribed and receiving.
    Ready,
    /// A decoded status frame.
    Update(SnapshotPatch),
    /// The link dropped; the transport keeps trying to reconnect.
    Lost {
        /// Why the link dropped.
        reason: String,
    },
}

/// A connection to the garden controller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which delivery model this transport uses.
    fn kind(&self) -> TransportKind;

    /// Fetch the latest device state.
    ///
    /// Pull transports return the full record; a record that does not exist
    /// yet is an empty snapshot, not an error. Push transports ask the broker
    /// to redeliver the retained status and return `Ok(None)`; the data then
    /// arrives through [`updates`](Self::updates).
    async fn fetch_latest(&self) -> Result<Option<DeviceSnapshot>, TransportError>;

    /// Take the update stream. Only push transports have one, and only the
    /// first call returns it.
    fn updates(&self) -> Option<UpdateStream> {
        None
    }

    /// Send a command to the device.
    async fn publish(&self, command: OutboundCommand) -> Result<(), SendError>;

    /// Whether the transport can currently fetch and publish.
    fn is_connected(&self) -> bool;

    /// Stop background work and release the connection.
    async fn close(&self);
}

/// Connect the transport selected by `config`.
///
/// # Errors
///
/// Returns [`ConnectError`] if the address is invalid, the store or broker
/// cannot be reached within the connect timeout, or the broker refuses the
/// connection.
pub async fn connect_transport(
    config: &TransportConfig,
    device_id: &str,
    timeouts: &TimeoutConfig,
    diagnostics: Arc<Diagnostics>,
) -> Result<Arc<dyn Transport>, ConnectError> {
    match config.backend {
        Backend::Store => {
            let url = config.store.url.as_deref().unwrap_or_default();
            let transport =
                RecordTransport::connect(url, device_id, timeouts.connect(), diagnostics).await?;
            info!("Connected to record store for {}", device_id);
            Ok(Arc::new(transport))
        }
        Backend::Mqtt => {
            let transport =
                MqttTransport::connect(&config.mqtt, timeouts.connect(), diagnostics).await?;
            Ok(Arc::new(transport))
        }
    }
}
