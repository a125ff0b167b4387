//! The single owner of the displayed device state.
//!
//! [`StateStore`] holds the latest [`DeviceSnapshot`] together with the
//! transport liveness flags the [`ConnectionStatus`] is derived from. The
//! view lives behind a [`tokio::sync::watch`] channel: every write is one
//! `send_if_modified` call, so a reader sees either the view before a merge
//! or the view after it, never a mix.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::debug;

use garden_types::{ConnectionStatus, DeviceSnapshot, SnapshotPatch};

/// Read-only view of the device state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateView {
    /// Last known device state.
    pub snapshot: DeviceSnapshot,
    /// Derived connection indicator.
    pub status: ConnectionStatus,
    /// When data was last applied.
    pub last_update: Option<OffsetDateTime>,
    /// Message of the last failed transport operation, cleared on success.
    pub last_error: Option<String>,
    liveness: Liveness,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Liveness {
    attached: bool,
    last_op_failed: bool,
    has_data: bool,
}

impl Liveness {
    fn status(self) -> ConnectionStatus {
        ConnectionStatus::derive(self.attached, self.last_op_failed, self.has_data)
    }
}

impl Default for StateView {
    fn default() -> Self {
        Self {
            snapshot: DeviceSnapshot::default(),
            status: ConnectionStatus::Disconnected,
            last_update: None,
            last_error: None,
            liveness: Liveness::default(),
        }
    }
}

impl StateView {
    /// Whether any field has been received since the transport attached.
    pub fn has_data(&self) -> bool {
        self.liveness.has_data
    }

    /// Whether a transport handle is attached.
    pub fn is_attached(&self) -> bool {
        self.liveness.attached
    }

    fn refresh_status(&mut self) {
        self.status = self.liveness.status();
    }
}

/// Shared store for the device snapshot and connection status.
///
/// Cloning is cheap; all clones write to the same view.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<StateView>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store. The status starts as `Disconnected`.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StateView::default());
        Self { tx: Arc::new(tx) }
    }

    /// Merge a partial update field by field.
    ///
    /// Only keys present in `patch` are written. A patch without any
    /// recognized key changes nothing and does not count as received data.
    /// Returns whether the view changed.
    pub fn apply_update(&self, patch: &SnapshotPatch) -> bool {
        if patch.is_empty() {
            debug!("Ignoring empty update");
            return false;
        }

        self.tx.send_if_modified(|view| {
            view.snapshot.merge(patch);
            view.liveness.has_data = true;
            view.last_update = Some(OffsetDateTime::now_utc());
            view.refresh_status();
            true
        })
    }

    /// Replace the snapshot wholesale.
    ///
    /// Data counts as received iff `snapshot` has at least one field.
    pub fn replace(&self, snapshot: DeviceSnapshot) {
        self.tx.send_modify(|view| {
            view.liveness.has_data = !snapshot.is_empty();
            view.snapshot = snapshot;
            view.last_update = Some(OffsetDateTime::now_utc());
            view.refresh_status();
        });
    }

    /// A copy of the current view.
    pub fn current_view(&self) -> StateView {
        self.tx.borrow().clone()
    }

    /// The current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.tx.borrow().status
    }

    /// Record a successful transport operation.
    pub fn mark_connected(&self) {
        self.tx.send_if_modified(|view| {
            let before = view.liveness;
            view.liveness.attached = true;
            view.liveness.last_op_failed = false;
            let had_error = view.last_error.take().is_some();
            view.refresh_status();
            had_error || before != view.liveness
        });
    }

    /// Record a failed transport operation.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|view| {
            view.liveness.last_op_failed = true;
            view.last_error = Some(reason);
            view.refresh_status();
        });
    }

    /// Record that the transport handle was released.
    pub fn mark_detached(&self) {
        self.tx.send_if_modified(|view| {
            if !view.liveness.attached {
                return false;
            }
            view.liveness.attached = false;
            view.refresh_status();
            true
        });
    }

    /// Subscribe to view changes.
    pub fn subscribe(&self) -> watch::Receiver<StateView> {
        self.tx.subscribe()
    }
}
