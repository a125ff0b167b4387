//! One operator session.
//!
//! A [`Session`] owns everything the dashboard needs for one view: the
//! [`StateStore`], the transport handle, the update feed of a push
//! transport, the [`CommandDispatcher`], notices and diagnostics. Nothing is
//! global; dropping or shutting down the session releases it all.
//!
//! Starting a session never fails. Bad configuration or an unreachable
//! controller leaves the session in a degraded state: no transport,
//! `Disconnected`, and a persistent "unavailable" notice explaining why.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use garden_types::{ConnectionStatus, OutboundCommand};

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::dispatch::{Ack, ActionQueue, ActionSender, CommandDispatcher, UserAction, action_channel};
use crate::error::{SendError, TransportError};
use crate::notice::{NoticeLevel, Notices};
use crate::render::Frame;
use crate::scheduler::{Wake, WakePolicy};
use crate::state::StateStore;
use crate::transport::{Transport, TransportEvent, TransportKind, UpdateStream, connect_transport};
use crate::video::resolve_video_url;

/// Events taken off the push channel, waiting to be applied.
#[derive(Debug, Default)]
struct UpdateFeed {
    stream: Option<UpdateStream>,
    buffered: VecDeque<TransportEvent>,
    ended: bool,
}

impl UpdateFeed {
    fn new(stream: Option<UpdateStream>) -> Self {
        Self {
            stream,
            ..Default::default()
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    /// Wait for the next event and keep it for the next drain.
    ///
    /// Returns `false` once the stream has ended.
    async fn wait(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return std::future::pending().await;
        };
        match stream.recv().await {
            Some(event) => {
                self.buffered.push_back(event);
                true
            }
            None => {
                self.stream = None;
                self.ended = true;
                false
            }
        }
    }

    /// Everything received so far, in arrival order.
    fn drain(&mut self) -> Vec<TransportEvent> {
        let mut events: Vec<_> = self.buffered.drain(..).collect();
        if let Some(stream) = self.stream.as_mut() {
            while let Some(event) = stream.try_recv() {
                events.push(event);
            }
            if stream.is_closed() && stream.is_empty() {
                self.stream = None;
                self.ended = true;
            }
        }
        events
    }

    /// Whether the stream ended since the last call.
    fn take_ended(&mut self) -> bool {
        std::mem::take(&mut self.ended)
    }
}

/// A dashboard session bound to one controller.
pub struct Session {
    config: Config,
    state: StateStore,
    transport: Option<Arc<dyn Transport>>,
    feed: UpdateFeed,
    dispatcher: CommandDispatcher,
    notices: Arc<Notices>,
    diagnostics: Arc<Diagnostics>,
    actions: ActionSender,
    queue: ActionQueue,
    pending: Vec<UserAction>,
    fetch_timeout: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.config.device_id)
            .field("transport", &self.transport_kind())
            .field("status", &self.state.status())
            .finish()
    }
}

impl Session {
    /// Validate `config`, connect the configured transport and start a session.
    ///
    /// Never fails; see the module docs for how problems are surfaced.
    pub async fn start(config: Config) -> Self {
        let mut session = Self::detached(config);

        if let Err(e) = session.config.validate() {
            warn!("Configuration unavailable: {}", e);
            session.unavailable(format!("Dashboard unavailable: {}", e));
            return session;
        }

        let connected = connect_transport(
            &session.config.transport,
            &session.config.device_id,
            &session.config.timeouts,
            Arc::clone(&session.diagnostics),
        )
        .await;

        match connected {
            Ok(transport) => {
                session.attach(transport);
                let timeout = session.config.timeouts.connect();
                session.await_ready(timeout).await;
            }
            Err(e) => {
                warn!("Could not connect to the garden controller: {}", e);
                session.unavailable(format!("Cannot reach the garden controller: {}", e));
            }
        }
        session
    }

    /// A session with no transport that shows why the dashboard is unavailable.
    pub fn degraded(config: Config, reason: impl std::fmt::Display) -> Self {
        let session = Self::detached(config);
        session.unavailable(format!("Dashboard unavailable: {}", reason));
        session
    }

    /// Start a session over an already connected transport.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let mut session = Self::detached(config);
        session.attach(transport);
        session
    }

    fn detached(config: Config) -> Self {
        let state = StateStore::new();
        let notices = Arc::new(Notices::new());
        let diagnostics = Arc::new(Diagnostics::new());
        let dispatcher = CommandDispatcher::new(
            state.clone(),
            None,
            Arc::clone(&notices),
            Arc::clone(&diagnostics),
        )
        .with_send_timeout(config.timeouts.send())
        .with_success_ttl(config.notices.success_ttl());
        let (actions, queue) = action_channel();

        Self {
            fetch_timeout: config.timeouts.fetch(),
            config,
            state,
            transport: None,
            feed: UpdateFeed::default(),
            dispatcher,
            notices,
            diagnostics,
            actions,
            queue,
            pending: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn attach(&mut self, transport: Arc<dyn Transport>) {
        info!(
            "Session for {} attached to {:?} transport",
            self.config.device_id,
            transport.kind()
        );
        self.feed = UpdateFeed::new(transport.updates());
        self.dispatcher.set_transport(Some(Arc::clone(&transport)));
        // a push transport is live once it reports Ready
        if transport.kind() == TransportKind::Pull {
            self.state.mark_connected();
        }
        self.transport = Some(transport);
    }

    /// Apply push events until the transport reports ready or `timeout` passes.
    ///
    /// A no-op for pull transports, which are live once connected.
    async fn await_ready(&mut self, timeout: Duration) {
        if self.transport_kind() != Some(TransportKind::Push) {
            return;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        while self.state.status() == ConnectionStatus::Disconnected {
            match tokio::time::timeout_at(deadline, self.feed.wait()).await {
                Ok(true) => self.apply_updates(),
                Ok(false) | Err(_) => break,
            }
        }
    }

    fn unavailable(&self, message: String) {
        self.state.mark_failed(message.clone());
        self.notices.post_persistent(NoticeLevel::Unavailable, message);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn notices(&self) -> &Arc<Notices> {
        &self.notices
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Kind of the attached transport, `None` while unavailable.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        self.transport.as_ref().map(|t| t.kind())
    }

    /// The wake policy matching the attached transport.
    pub fn wake_policy(&self) -> WakePolicy {
        WakePolicy::for_transport(self.transport_kind(), &self.config.refresh)
    }

    /// A handle for queueing user actions from another task.
    pub fn actions(&self) -> ActionSender {
        self.actions.clone()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Re-synchronize with the controller once.
    ///
    /// Pull transports fetch and replace the snapshot. Push transports apply
    /// every queued update in arrival order and, when `request_fetch` is set,
    /// ask the broker to redeliver the retained status. Failures only change
    /// the connection status; the next sync retries.
    pub async fn sync(&mut self, request_fetch: bool) {
        let Some(transport) = self.transport.clone() else {
            return;
        };

        match transport.kind() {
            TransportKind::Pull => self.pull(transport.as_ref()).await,
            TransportKind::Push => {
                self.apply_updates();
                if request_fetch {
                    self.request_redelivery(transport.as_ref()).await;
                }
            }
        }
    }

    async fn pull(&self, transport: &dyn Transport) {
        let result = tokio::time::timeout(self.fetch_timeout, transport.fetch_latest())
            .await
            .unwrap_or_else(|_| Err(TransportError::timeout("fetch", self.fetch_timeout)));

        match result {
            Ok(Some(snapshot)) => {
                self.diagnostics.record_fetch_success();
                self.state.mark_connected();
                self.state.replace(snapshot);
            }
            Ok(None) => {
                self.diagnostics.record_fetch_success();
                self.state.mark_connected();
            }
            Err(TransportError::Decode(e)) => {
                // the read itself worked; keep the last good snapshot
                debug!("Keeping previous snapshot after decode failure: {}", e);
                self.state.mark_connected();
            }
            Err(e) => {
                warn!("Fetch failed: {}", e);
                self.diagnostics.record_fetch_failure();
                self.state.mark_failed(e.to_string());
            }
        }
    }

    fn apply_updates(&mut self) {
        for event in self.feed.drain() {
            match event {
                TransportEvent::Ready => self.state.mark_connected(),
                TransportEvent::Update(patch) => {
                    self.state.mark_connected();
                    if self.state.apply_update(&patch) {
                        self.diagnostics.record_update_applied();
                    }
                }
                TransportEvent::Lost { reason } => {
                    warn!("Connection lost: {}", reason);
                    self.state.mark_failed(reason);
                }
            }
        }

        if self.feed.take_ended() {
            warn!("Update stream ended");
            self.state.mark_failed("update stream ended");
        }
    }

    async fn request_redelivery(&self, transport: &dyn Transport) {
        let result = tokio::time::timeout(self.fetch_timeout, transport.fetch_latest())
            .await
            .unwrap_or_else(|_| Err(TransportError::timeout("fetch", self.fetch_timeout)));

        match result {
            Ok(_) => self.diagnostics.record_fetch_success(),
            Err(TransportError::NotConnected) => {
                // still subscribing or reconnecting; Ready re-delivers anyway
                debug!("Skipping redelivery request until the transport is ready");
            }
            Err(e) => {
                debug!("Redelivery request failed: {}", e);
                self.diagnostics.record_fetch_failure();
                self.state.mark_failed(e.to_string());
            }
        }
    }

    /// Wait until the next cycle is due.
    ///
    /// Ends on the first of: cancellation, a queued user action, an incoming
    /// update (push policy only), or the policy's period elapsing.
    pub async fn wait_for_wake(&mut self, policy: &WakePolicy) -> Wake {
        let watch_updates = policy.wakes_on_update() && self.feed.is_live();
        let sleep = tokio::time::sleep(policy.period());
        tokio::pin!(sleep);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Wake::Cancelled,
            Some(action) = self.queue.recv() => {
                self.pending.push(action);
                Wake::Action
            }
            _ = self.feed.wait(), if watch_updates => Wake::Update,
            _ = &mut sleep => Wake::Timer,
        }
    }

    /// Dispatch every user action queued since the last call, in order.
    pub async fn dispatch_pending(&mut self) -> Vec<Result<Ack, SendError>> {
        while let Ok(action) = self.queue.try_recv() {
            self.pending.push(action);
        }

        let mut outcomes = Vec::with_capacity(self.pending.len());
        for action in std::mem::take(&mut self.pending) {
            debug!("Handling {} action {}", action.control.label(), action.id);
            outcomes.push(self.dispatcher.dispatch_action(action).await);
        }
        outcomes
    }

    /// Send a command immediately.
    pub async fn dispatch(&self, command: OutboundCommand) -> Result<Ack, SendError> {
        self.dispatcher.dispatch(command).await
    }

    /// Build the frame for the next render.
    pub fn frame(&self) -> Frame {
        let view = self.state.current_view();
        let video_url = resolve_video_url(self.config.video.stream_host.as_deref(), &view.snapshot);
        Frame {
            view,
            notices: self.notices.active(),
            video_url,
            transport: self.transport_kind(),
        }
    }

    /// Stop background work and release the transport.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.dispatcher.set_transport(None);
        self.feed = UpdateFeed::default();
        if let Some(transport) = self.transport.take() {
            transport.close().await;
            info!("Session for {} shut down", self.config.device_id);
        }
        self.state.mark_detached();
    }
}

#[cfg(test)]
mod tests {
    use garden_types::{ConnectionStatus, DeviceSnapshot, Mode, SnapshotPatch};

    use super::*;
    use crate::config::Backend;
    use crate::dispatch::Control;
    use crate::mock::MockTransport;

    fn patch_temp(temp: f64) -> SnapshotPatch {
        SnapshotPatch {
            air_temp: Some(Some(temp)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_degraded_session_shows_reason() {
        let session = Session::degraded(Config::default(), "unknown backend 'bogus'");
        let frame = session.frame();
        assert_eq!(frame.view.status, ConnectionStatus::Disconnected);
        assert!(frame.transport.is_none());
        assert_eq!(frame.notices.len(), 1);
        assert_eq!(frame.notices[0].level, NoticeLevel::Unavailable);
        assert_eq!(
            frame.notices[0].message,
            "Dashboard unavailable: unknown backend 'bogus'"
        );
    }

    #[tokio::test]
    async fn test_missing_store_url_is_unavailable() {
        let mut config = Config::default();
        config.transport.backend = Backend::Store;
        config.transport.store.url = None;

        let session = Session::start(config).await;
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);
        assert!(session.transport_kind().is_none());

        let frame = session.frame();
        assert_eq!(frame.notices.len(), 1);
        assert_eq!(frame.notices[0].level, NoticeLevel::Unavailable);
        assert!(!frame.notices[0].is_transient());
    }

    #[tokio::test]
    async fn test_unsupported_store_url_is_unavailable() {
        let mut config = Config::default();
        config.transport.store.url = Some("mongodb+srv://cluster0.example.net".into());

        let session = Session::start(config).await;
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);
        let notices = session.notices().active();
        assert!(notices[0].message.contains("Cannot reach the garden controller"));
        assert!(notices[0].message.contains("MongoDB is not supported"));
    }

    #[tokio::test]
    async fn test_start_with_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transport.store.url = Some(dir.path().join("status.db").display().to_string());

        let mut session = Session::start(config).await;
        assert_eq!(session.transport_kind(), Some(TransportKind::Pull));

        // empty store: connected, nothing to show
        session.sync(true).await;
        assert_eq!(session.state().status(), ConnectionStatus::ConnectedNoData);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_pull_sync_replaces_snapshot() {
        let transport = Arc::new(MockTransport::pull());
        transport.set_snapshot(DeviceSnapshot {
            mode: Some(Mode::Auto),
            soil_moisture: Some(1800),
            ..Default::default()
        });
        let mut session = Session::with_transport(Config::default(), transport.clone());

        session.sync(false).await;
        let view = session.state().current_view();
        assert_eq!(view.status, ConnectionStatus::ConnectedWithData);
        assert_eq!(view.snapshot.soil_moisture, Some(1800));

        // the next record replaces wholesale
        transport.set_snapshot(DeviceSnapshot {
            mode: Some(Mode::Manual),
            ..Default::default()
        });
        session.sync(false).await;
        let view = session.state().current_view();
        assert_eq!(view.snapshot.soil_moisture, None);
        assert_eq!(view.snapshot.mode, Some(Mode::Manual));
    }

    #[tokio::test]
    async fn test_pull_failure_degrades_then_recovers() {
        let transport = Arc::new(MockTransport::pull());
        transport.set_snapshot(DeviceSnapshot {
            water_level: Some(300),
            ..Default::default()
        });
        let mut session = Session::with_transport(Config::default(), transport.clone());
        session.sync(false).await;

        transport.fail_fetch(Some("connection reset"));
        session.sync(false).await;
        let view = session.state().current_view();
        assert_eq!(view.status, ConnectionStatus::Disconnected);
        assert_eq!(view.last_error.as_deref(), Some("Broker error: connection reset"));
        // last known data stays visible
        assert_eq!(view.snapshot.water_level, Some(300));

        transport.fail_fetch(None);
        session.sync(false).await;
        assert_eq!(session.state().status(), ConnectionStatus::ConnectedWithData);
        assert_eq!(session.diagnostics().snapshot().fetch_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_fetch_timeout() {
        let transport = Arc::new(MockTransport::pull());
        transport.set_fetch_latency(Duration::from_secs(60));
        let mut session = Session::with_transport(Config::default(), transport);

        session.sync(false).await;
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_push_updates_apply_in_order() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());

        transport.push_event(TransportEvent::Ready);
        transport.push_update(patch_temp(20.0));
        transport.push_update(SnapshotPatch {
            air_humidity: Some(Some(40.0)),
            ..Default::default()
        });
        transport.push_update(patch_temp(21.5));

        session.sync(false).await;
        let view = session.state().current_view();
        assert_eq!(view.snapshot.air_temp, Some(21.5));
        assert_eq!(view.snapshot.air_humidity, Some(40.0));
        assert_eq!(view.status, ConnectionStatus::ConnectedWithData);
        // push sync without a fetch request does not touch the broker
        assert_eq!(transport.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_push_is_not_live_until_ready() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);

        // a redelivery request while still subscribing is skipped
        transport.set_connected(false);
        session.sync(true).await;
        assert_eq!(session.state().current_view().last_error, None);
        transport.set_connected(true);
        session.sync(true).await;
        assert_eq!(session.state().current_view().last_error, None);

        transport.push_event(TransportEvent::Ready);
        session.sync(false).await;
        assert_eq!(session.state().status(), ConnectionStatus::ConnectedNoData);
    }

    #[tokio::test]
    async fn test_await_ready_applies_queued_events() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());
        transport.push_event(TransportEvent::Ready);
        transport.push_update(patch_temp(19.0));

        session.await_ready(Duration::from_secs(1)).await;
        let view = session.state().current_view();
        assert_eq!(view.status, ConnectionStatus::ConnectedWithData);
        assert_eq!(view.snapshot.air_temp, Some(19.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_ready_gives_up() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport);

        session.await_ready(Duration::from_secs(3)).await;
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_push_lost_and_ended() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());

        transport.push_update(patch_temp(18.0));
        transport.push_event(TransportEvent::Lost {
            reason: "keep-alive timeout".into(),
        });
        session.sync(false).await;
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);

        transport.push_event(TransportEvent::Ready);
        session.sync(false).await;
        assert_eq!(session.state().status(), ConnectionStatus::ConnectedWithData);

        transport.end_updates();
        session.sync(false).await;
        let view = session.state().current_view();
        assert_eq!(view.status, ConnectionStatus::Disconnected);
        assert_eq!(view.last_error.as_deref(), Some("update stream ended"));
    }

    #[tokio::test]
    async fn test_empty_update_is_not_data() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());

        transport.push_update(SnapshotPatch::default());
        session.sync(false).await;
        assert_eq!(session.state().status(), ConnectionStatus::ConnectedNoData);
        assert_eq!(session.diagnostics().snapshot().updates_applied, 0);
    }

    #[tokio::test]
    async fn test_actions_dispatch_once_in_order() {
        let transport = Arc::new(MockTransport::pull());
        transport.set_snapshot(DeviceSnapshot {
            mode: Some(Mode::Manual),
            ..Default::default()
        });
        let mut session = Session::with_transport(Config::default(), transport.clone());
        session.sync(false).await;

        let actions = session.actions();
        actions.send(Control::PumpOn);
        actions.send(Control::ToggleMode);

        let outcomes = session.dispatch_pending().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(Result::is_ok));
        assert!(session.dispatch_pending().await.is_empty());
        assert_eq!(
            transport.published(),
            vec![OutboundCommand::PumpOn, OutboundCommand::ToggleMode]
        );
    }

    #[tokio::test]
    async fn test_frame_uses_configured_stream_host() {
        let mut config = Config::default();
        config.video.stream_host = Some("cam.ngrok.app".into());
        let session = Session::with_transport(config, Arc::new(MockTransport::pull()));
        assert_eq!(
            session.frame().video_url.as_deref(),
            Some("https://cam.ngrok.app/video_feed")
        );
    }

    #[tokio::test]
    async fn test_shutdown_releases_transport() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());
        let cancel = session.cancel_token();

        session.shutdown().await;
        assert!(cancel.is_cancelled());
        assert!(transport.is_closed());
        assert!(session.transport_kind().is_none());
        assert_eq!(session.state().status(), ConnectionStatus::Disconnected);
        assert_eq!(
            session.dispatch(OutboundCommand::ToggleMode).await,
            Err(SendError::Disconnected)
        );

        // second call is a no-op
        session.shutdown().await;
    }
}
