//! Pull transport over the record store.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use garden_store::Store;
use garden_types::{DeviceSnapshot, OutboundCommand};

use super::{Transport, TransportKind};
use crate::diagnostics::Diagnostics;
use crate::error::{ConnectError, SendError, TransportError};

const SQLITE_SCHEME: &str = "sqlite://";

/// Reads the status record and writes the command mailbox.
///
/// Store calls are blocking, so each one runs on the blocking pool while
/// holding the store lock.
pub struct RecordTransport {
    store: Arc<Mutex<Store>>,
    device_id: String,
    diagnostics: Arc<Diagnostics>,
    closed: AtomicBool,
}

impl std::fmt::Debug for RecordTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordTransport")
            .field("device_id", &self.device_id)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RecordTransport {
    /// Open the store named by `url` and check that it answers.
    pub async fn connect(
        url: &str,
        device_id: &str,
        connect_timeout: Duration,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self, ConnectError> {
        let path = store_path(url)?;
        info!("Opening record store {}", path.display());

        let open = tokio::task::spawn_blocking(move || {
            let store = Store::open(&path)?;
            store.ping()?;
            Ok::<_, garden_store::Error>(store)
        });

        let store = match tokio::time::timeout(connect_timeout, open).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => return Err(ConnectError::Unreachable(join.to_string())),
            Err(_) => return Err(ConnectError::Timeout(connect_timeout)),
        };

        Ok(Self::from_store(store, device_id, diagnostics))
    }

    /// Wrap an already open store.
    pub fn from_store(store: Store, device_id: &str, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            device_id: device_id.to_string(),
            diagnostics,
            closed: AtomicBool::new(false),
        }
    }

    /// The record identifier this transport reads.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[async_trait]
impl Transport for RecordTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pull
    }

    async fn fetch_latest(&self) -> Result<Option<DeviceSnapshot>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let store = Arc::clone(&self.store).lock_owned().await;
        let device_id = self.device_id.clone();
        let found = tokio::task::spawn_blocking(move || store.find_status(&device_id))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?;

        match found {
            Ok(Some(stored)) => Ok(Some(stored.snapshot)),
            Ok(None) => {
                debug!("No status record for {} yet", self.device_id);
                Ok(Some(DeviceSnapshot::default()))
            }
            Err(garden_store::Error::Decode { source, .. }) => {
                warn!("Dropping malformed status record for {}: {}", self.device_id, source);
                self.diagnostics.record_decode_failure(source.to_string());
                Err(TransportError::Decode(source))
            }
            Err(e) => Err(TransportError::Store(e)),
        }
    }

    async fn publish(&self, command: OutboundCommand) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Disconnected);
        }

        let store = Arc::clone(&self.store).lock_owned().await;
        let device_id = self.device_id.clone();
        tokio::task::spawn_blocking(move || store.set_command(&device_id, command.as_str()))
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?
            .map_err(|e| SendError::Transport(e.to_string()))?;

        info!("Staged {} for {}", command, self.device_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Record transport for {} closed", self.device_id);
        }
    }
}

/// Turn a connection string into a database path.
fn store_path(url: &str) -> Result<PathBuf, ConnectError> {
    let trimmed = url.trim();
    let invalid = |reason: &str| ConnectError::InvalidAddress {
        address: url.to_string(),
        reason: reason.to_string(),
    };

    let path = match trimmed.strip_prefix(SQLITE_SCHEME) {
        Some(path) => path,
        None if trimmed.starts_with("mongodb") => {
            return Err(invalid(
                "MongoDB is not supported, use a SQLite path or sqlite:// URL",
            ));
        }
        None if trimmed.contains("://") => {
            return Err(invalid("unsupported scheme, expected a path or sqlite://"));
        }
        None => trimmed,
    };

    if path.is_empty() {
        return Err(invalid("database path is empty"));
    }
    Ok(PathBuf::from(path))
}
