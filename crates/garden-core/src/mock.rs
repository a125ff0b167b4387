//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`Transport`] without a store or broker, so
//! sessions, dispatch and the refresh cycle can be exercised in unit tests.
//!
//! # Features
//!
//! - **Pull or push**: a pull mock serves a settable snapshot; a push mock
//!   also hands out an [`UpdateStream`] fed by [`MockTransport::push_event`]
//! - **Failure injection**: make fetches or publishes fail with a message
//! - **Latency simulation**: delay fetches and publishes to exercise timeouts

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use garden_types::{DeviceSnapshot, OutboundCommand, SnapshotPatch};

use crate::error::{SendError, TransportError};
use crate::transport::{Transport, TransportEvent, TransportKind, UPDATE_CHANNEL_CAPACITY, UpdateStream};

/// A scriptable transport.
///
/// # Example
///
/// ```
/// use garden_core::{MockTransport, Transport};
/// use garden_types::{DeviceSnapshot, Mode, OutboundCommand};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::pull();
///     transport.set_snapshot(DeviceSnapshot {
///         mode: Some(Mode::Manual),
///         ..Default::default()
///     });
///
///     let snapshot = transport.fetch_latest().await.unwrap().unwrap();
///     assert!(snapshot.is_manual());
///
///     transport.publish(OutboundCommand::PumpOn).await.unwrap();
///     assert_eq!(transport.published(), vec![OutboundCommand::PumpOn]);
/// }
/// ```
pub struct MockTransport {
    kind: TransportKind,
    snapshot: Mutex<DeviceSnapshot>,
    connected: AtomicBool,
    closed: AtomicBool,
    fetch_count: AtomicU32,
    fetch_error: Mutex<Option<String>>,
    publish_error: Mutex<Option<String>>,
    /// Simulated fetch latency in milliseconds (0 = no delay).
    fetch_latency_ms: AtomicU64,
    /// Simulated publish latency in milliseconds (0 = no delay).
    publish_latency_ms: AtomicU64,
    published: Mutex<Vec<OutboundCommand>>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    stream: Mutex<Option<UpdateStream>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("kind", &self.kind)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("fetch_count", &self.fetch_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockTransport {
    /// A pull transport serving an empty snapshot.
    pub fn pull() -> Self {
        Self::with_kind(TransportKind::Pull, None, None)
    }

    /// A push transport with an update stream.
    pub fn push() -> Self {
        let (tx, stream) = UpdateStream::channel(UPDATE_CHANNEL_CAPACITY);
        Self::with_kind(TransportKind::Push, Some(tx), Some(stream))
    }

    fn with_kind(
        kind: TransportKind,
        events: Option<mpsc::Sender<TransportEvent>>,
        stream: Option<UpdateStream>,
    ) -> Self {
        Self {
            kind,
            snapshot: Mutex::new(DeviceSnapshot::default()),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            fetch_count: AtomicU32::new(0),
            fetch_error: Mutex::new(None),
            publish_error: Mutex::new(None),
            fetch_latency_ms: AtomicU64::new(0),
            publish_latency_ms: AtomicU64::new(0),
            published: Mutex::new(Vec::new()),
            events: Mutex::new(events),
            stream: Mutex::new(stream),
        }
    }

    /// Set the snapshot returned by pull fetches.
    pub fn set_snapshot(&self, snapshot: DeviceSnapshot) {
        *lock(&self.snapshot) = snapshot;
    }

    /// Make fetches fail with `message`, or succeed again with `None`.
    pub fn fail_fetch(&self, message: Option<&str>) {
        *lock(&self.fetch_error) = message.map(str::to_string);
    }

    /// Make publishes fail with `message`, or succeed again with `None`.
    pub fn fail_publish(&self, message: Option<&str>) {
        *lock(&self.publish_error) = message.map(str::to_string);
    }

    pub fn set_fetch_latency(&self, latency: Duration) {
        self.fetch_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_publish_latency(&self, latency: Duration) {
        self.publish_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set what [`Transport::is_connected`] reports.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    /// Queue an event on the update stream.
    ///
    /// Returns `false` for pull mocks or once the events side is closed.
    pub fn push_event(&self, event: TransportEvent) -> bool {
        lock(&self.events)
            .as_ref()
            .is_some_and(|tx| tx.try_send(event).is_ok())
    }

    /// Queue a status frame on the update stream.
    pub fn push_update(&self, patch: SnapshotPatch) -> bool {
        self.push_event(TransportEvent::Update(patch))
    }

    /// Close the events side, ending the update stream.
    pub fn end_updates(&self) {
        lock(&self.events).take();
    }

    /// Commands published so far, in order.
    pub fn published(&self) -> Vec<OutboundCommand> {
        lock(&self.published).clone()
    }

    pub fn publish_count(&self) -> usize {
        lock(&self.published).len()
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::Relaxed)
    }

    /// Whether [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn simulate_latency(latency_ms: &AtomicU64) {
        let ms = latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn fetch_latest(&self) -> Result<Option<DeviceSnapshot>, TransportError> {
        Self::simulate_latency(&self.fetch_latency_ms).await;
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if let Some(message) = lock(&self.fetch_error).clone() {
            return Err(TransportError::Broker(message));
        }
        // a push transport only re-subscribes while connected
        if self.kind == TransportKind::Push && !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        match self.kind {
            TransportKind::Pull => Ok(Some(lock(&self.snapshot).clone())),
            TransportKind::Push => Ok(None),
        }
    }

    fn updates(&self) -> Option<UpdateStream> {
        lock(&self.stream).take()
    }

    async fn publish(&self, command: OutboundCommand) -> Result<(), SendError> {
        Self::simulate_latency(&self.publish_latency_ms).await;

        if self.is_closed() {
            return Err(SendError::Disconnected);
        }
        lock(&self.published).push(command);

        match lock(&self.publish_error).clone() {
            Some(message) => Err(SendError::Transport(message)),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.is_closed()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.end_updates();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
