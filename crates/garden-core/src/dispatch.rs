//! Turning user actions into outbound commands.
//!
//! Each control activation becomes one [`UserAction`] with a fresh
//! [`ActionId`]. The dispatcher handles every id at most once, checks the
//! local guards, and sends through the transport under a timeout. It never
//! touches the snapshot: the device's next report is what shows the effect.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use garden_types::{ConnectionStatus, Mode, OutboundCommand};

use crate::diagnostics::Diagnostics;
use crate::error::SendError;
use crate::notice::{DEFAULT_TRANSIENT_TTL, NoticeLevel, Notices};
use crate::state::StateStore;
use crate::transport::Transport;

/// Default bound on a single send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the user action queue.
pub const ACTION_QUEUE_CAPACITY: usize = 32;

/// Identifier of one control activation. Ids increase monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A dashboard control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// "Turn Pump ON" button.
    PumpOn,
    /// "Turn Pump OFF" button.
    PumpOff,
    /// Mode toggle.
    ToggleMode,
}

impl Control {
    /// The command this control sends.
    pub fn command(self) -> OutboundCommand {
        match self {
            Control::PumpOn => OutboundCommand::PumpOn,
            Control::PumpOff => OutboundCommand::PumpOff,
            Control::ToggleMode => OutboundCommand::ToggleMode,
        }
    }

    /// Button caption.
    pub fn label(self) -> &'static str {
        match self {
            Control::PumpOn => "Turn Pump ON",
            Control::PumpOff => "Turn Pump OFF",
            Control::ToggleMode => "Toggle Mode",
        }
    }

    /// Whether the control is usable in the given mode.
    pub fn is_enabled(self, mode: Mode) -> bool {
        !self.command().requires_manual_mode() || mode == Mode::Manual
    }
}

impl FromStr for Control {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "pump on" | "pump_on" => Ok(Control::PumpOn),
            "off" | "pump off" | "pump_off" => Ok(Control::PumpOff),
            "mode" | "toggle" | "toggle_mode" => Ok(Control::ToggleMode),
            other => Err(format!("unknown control '{}' (expected on, off or mode)", other)),
        }
    }
}

/// One activation of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAction {
    pub id: ActionId,
    pub control: Control,
}

/// Successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub command: OutboundCommand,
    /// The action that caused the send, if any.
    pub action: Option<ActionId>,
}

/// Hands user actions to the refresh cycle.
///
/// Cloneable; every clone draws ids from the same counter.
#[derive(Debug, Clone)]
pub struct ActionSender {
    tx: mpsc::Sender<UserAction>,
    next_id: Arc<AtomicU64>,
}

/// Receiving end of [`ActionSender`].
pub type ActionQueue = mpsc::Receiver<UserAction>;

/// Create a bounded action queue.
pub fn action_channel() -> (ActionSender, ActionQueue) {
    let (tx, rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
    let sender = ActionSender {
        tx,
        next_id: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

impl ActionSender {
    /// Queue one activation of `control`.
    ///
    /// Returns the new action's id, or `None` if the session is gone or the
    /// queue is full.
    pub fn send(&self, control: Control) -> Option<ActionId> {
        let id = ActionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        match self.tx.try_send(UserAction { id, control }) {
            Ok(()) => Some(id),
            Err(e) => {
                warn!("Dropping {} action {}: {}", control.label(), id, e);
                None
            }
        }
    }
}

/// Sends commands to the device with local guards.
pub struct CommandDispatcher {
    state: StateStore,
    transport: Option<Arc<dyn Transport>>,
    notices: Arc<Notices>,
    diagnostics: Arc<Diagnostics>,
    send_timeout: Duration,
    success_ttl: Duration,
    last_handled: AtomicU64,
    /// Id of the failure notice from the previous send, 0 if none.
    failure_notice: AtomicU64,
}

impl CommandDispatcher {
    /// Create a dispatcher reading guards from `state` and sending via `transport`.
    pub fn new(
        state: StateStore,
        transport: Option<Arc<dyn Transport>>,
        notices: Arc<Notices>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            state,
            transport,
            notices,
            diagnostics,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            success_ttl: DEFAULT_TRANSIENT_TTL,
            last_handled: AtomicU64::new(0),
            failure_notice: AtomicU64::new(0),
        }
    }

    /// Set the bound on a single send.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set how long success notices stay up.
    #[must_use]
    pub fn with_success_ttl(mut self, ttl: Duration) -> Self {
        self.success_ttl = ttl;
        self
    }

    /// Replace the transport handle.
    pub fn set_transport(&mut self, transport: Option<Arc<dyn Transport>>) {
        self.transport = transport;
    }

    /// Handle a user action.
    ///
    /// An action whose id is not newer than the last handled one is rejected
    /// with [`SendError::Duplicate`] and nothing is sent.
    pub async fn dispatch_action(&self, action: UserAction) -> Result<Ack, SendError> {
        let previous = self
            .last_handled
            .fetch_max(action.id.get(), Ordering::AcqRel);
        if previous >= action.id.get() {
            debug!("Skipping already handled action {}", action.id);
            return Err(SendError::Duplicate(action.id));
        }

        self.send(action.control.command(), Some(action.id)).await
    }

    /// Send a command.
    ///
    /// # Errors
    ///
    /// - [`SendError::ModeRestricted`] for pump commands outside manual mode
    /// - [`SendError::Disconnected`] when no live transport is attached
    /// - [`SendError::Timeout`] or [`SendError::Transport`] when sending fails
    pub async fn dispatch(&self, command: OutboundCommand) -> Result<Ack, SendError> {
        self.send(command, None).await
    }

    async fn send(
        &self,
        command: OutboundCommand,
        action: Option<ActionId>,
    ) -> Result<Ack, SendError> {
        let view = self.state.current_view();

        let mode = view.snapshot.mode.unwrap_or_default();
        if command.requires_manual_mode() && mode != Mode::Manual {
            return Err(self.reject(SendError::ModeRestricted { command, mode }));
        }

        let transport = match &self.transport {
            Some(transport)
                if view.status != ConnectionStatus::Disconnected && transport.is_connected() =>
            {
                transport
            }
            _ => return Err(self.reject(SendError::Disconnected)),
        };

        let result = match tokio::time::timeout(self.send_timeout, transport.publish(command)).await
        {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(()) => {
                self.diagnostics.record_command_sent();
                self.replace_failure_notice(0);
                self.notices.post_transient(
                    NoticeLevel::Success,
                    format!("Command sent: {}", command),
                    self.success_ttl,
                );
                info!("Dispatched {}", command);
                Ok(Ack { command, action })
            }
            Err(e) => {
                warn!("Failed to send {}: {}", command, e);
                self.diagnostics.record_command_failed();
                let id = self.notices.post_persistent(
                    NoticeLevel::Error,
                    format!("Failed to send {}: {}", command, e),
                );
                self.replace_failure_notice(id);
                Err(e)
            }
        }
    }

    fn reject(&self, error: SendError) -> SendError {
        debug!("Rejected locally: {}", error);
        self.diagnostics.record_command_rejected();
        let level = match error {
            SendError::ModeRestricted { .. } => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        let id = self.notices.post_persistent(level, error.to_string());
        self.replace_failure_notice(id);
        error
    }

    /// Only the latest send failure stays on screen.
    fn replace_failure_notice(&self, id: u64) {
        let previous = self.failure_notice.swap(id, Ordering::AcqRel);
        if previous != 0 {
            self.notices.dismiss(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use garden_types::SnapshotPatch;

    use super::*;
    use crate::mock::MockTransport;

    fn setup(mode: Mode) -> (StateStore, Arc<MockTransport>, Arc<Notices>, CommandDispatcher) {
        let state = StateStore::new();
        state.mark_connected();
        state.apply_update(&SnapshotPatch {
            mode: Some(Some(mode)),
            pump_on: Some(Some(false)),
            ..Default::default()
        });

        let transport = Arc::new(MockTransport::pull());
        let notices = Arc::new(Notices::new());
        let dispatcher = CommandDispatcher::new(
            state.clone(),
            Some(transport.clone() as Arc<dyn Transport>),
            Arc::clone(&notices),
            Arc::new(Diagnostics::new()),
        );
        (state, transport, notices, dispatcher)
    }

    #[test]
    fn test_control_parsing() {
        assert_eq!("on".parse::<Control>().unwrap(), Control::PumpOn);
        assert_eq!(" OFF ".parse::<Control>().unwrap(), Control::PumpOff);
        assert_eq!("mode".parse::<Control>().unwrap(), Control::ToggleMode);
        assert!("water".parse::<Control>().is_err());
    }

    #[test]
    fn test_control_enabled_by_mode() {
        assert!(Control::PumpOn.is_enabled(Mode::Manual));
        assert!(!Control::PumpOn.is_enabled(Mode::Auto));
        assert!(!Control::PumpOff.is_enabled(Mode::Unknown));
        assert!(Control::ToggleMode.is_enabled(Mode::Auto));
    }

    #[tokio::test]
    async fn test_action_ids_increase() {
        let (sender, mut queue) = action_channel();
        let a = sender.send(Control::PumpOn).unwrap();
        let b = sender.clone().send(Control::ToggleMode).unwrap();
        assert!(b > a);

        assert_eq!(queue.recv().await.unwrap().id, a);
        assert_eq!(queue.recv().await.unwrap().control, Control::ToggleMode);
    }

    #[tokio::test]
    async fn test_pump_on_in_manual_mode() {
        let (state, transport, notices, dispatcher) = setup(Mode::Manual);
        let before = state.current_view();

        let ack = dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap();
        assert_eq!(ack.command, OutboundCommand::PumpOn);
        assert_eq!(transport.published(), vec![OutboundCommand::PumpOn]);
        // no optimistic update
        assert_eq!(state.current_view(), before);

        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Success);
        assert!(active[0].is_transient());
    }

    #[tokio::test]
    async fn test_mode_guard_blocks_pump_commands() {
        for mode in [Mode::Auto, Mode::Unknown] {
            let (_, transport, notices, dispatcher) = setup(mode);
            for command in [
                OutboundCommand::PumpOn,
                OutboundCommand::PumpOff,
                OutboundCommand::TogglePump,
            ] {
                let err = dispatcher.dispatch(command).await.unwrap_err();
                assert!(matches!(err, SendError::ModeRestricted { .. }));
            }
            assert_eq!(transport.publish_count(), 0);
            assert_eq!(notices.active()[0].level, NoticeLevel::Warning);
        }
    }

    #[tokio::test]
    async fn test_toggle_mode_allowed_in_auto() {
        let (_, transport, _, dispatcher) = setup(Mode::Auto);
        dispatcher.dispatch(OutboundCommand::ToggleMode).await.unwrap();
        assert_eq!(transport.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_is_rejected_without_send() {
        let (state, transport, notices, dispatcher) = setup(Mode::Manual);
        state.mark_failed("broker went away");
        let before = state.current_view();

        let err = dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap_err();
        assert_eq!(err, SendError::Disconnected);
        assert_eq!(transport.publish_count(), 0);
        assert_eq!(state.current_view(), before);
        assert_eq!(notices.active()[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_no_transport_is_disconnected() {
        let state = StateStore::new();
        let dispatcher = CommandDispatcher::new(
            state,
            None,
            Arc::new(Notices::new()),
            Arc::new(Diagnostics::new()),
        );
        assert_eq!(
            dispatcher.dispatch(OutboundCommand::ToggleMode).await,
            Err(SendError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_duplicate_action_is_sent_once() {
        let (_, transport, _, dispatcher) = setup(Mode::Manual);
        let action = UserAction {
            id: ActionId::new(7),
            control: Control::PumpOff,
        };

        dispatcher.dispatch_action(action).await.unwrap();
        assert_eq!(
            dispatcher.dispatch_action(action).await,
            Err(SendError::Duplicate(ActionId::new(7)))
        );
        // an older id is also stale
        let older = UserAction {
            id: ActionId::new(3),
            control: Control::PumpOn,
        };
        assert!(matches!(
            dispatcher.dispatch_action(older).await,
            Err(SendError::Duplicate(_))
        ));
        assert_eq!(transport.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_posts_persistent_error() {
        let (_, transport, notices, dispatcher) = setup(Mode::Manual);
        transport.fail_publish(Some("write rejected"));

        let err = dispatcher.dispatch(OutboundCommand::PumpOff).await.unwrap_err();
        assert_eq!(err, SendError::Transport("write rejected".into()));

        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Error);
        assert!(!active[0].is_transient());
        // no retry
        assert_eq!(transport.publish_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_is_bounded_by_timeout() {
        let (_, transport, _, dispatcher) = setup(Mode::Manual);
        let dispatcher = dispatcher.with_send_timeout(Duration::from_secs(2));
        transport.set_publish_latency(Duration::from_secs(60));

        let err = dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap_err();
        assert_eq!(err, SendError::Timeout(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_failure_notices_do_not_pile_up() {
        let (state, transport, notices, dispatcher) = setup(Mode::Auto);
        for _ in 0..50 {
            assert!(dispatcher.dispatch(OutboundCommand::PumpOn).await.is_err());
        }
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Warning);

        state.apply_update(&SnapshotPatch {
            mode: Some(Some(Mode::Manual)),
            ..Default::default()
        });
        transport.fail_publish(Some("write rejected"));
        dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap_err();
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Error);

        // a later success clears the stale error
        transport.fail_publish(None);
        dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap();
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_failure_notice_leaves_other_notices() {
        let (_, _, notices, dispatcher) = setup(Mode::Auto);
        notices.post_persistent(NoticeLevel::Unavailable, "store offline");
        dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap_err();
        dispatcher.dispatch(OutboundCommand::PumpOff).await.unwrap_err();

        let levels: Vec<_> = notices.active().iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NoticeLevel::Unavailable, NoticeLevel::Warning]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_notice_auto_dismisses() {
        let (_, _, notices, dispatcher) = setup(Mode::Manual);
        let dispatcher = dispatcher.with_success_ttl(Duration::from_secs(4));
        dispatcher.dispatch(OutboundCommand::PumpOn).await.unwrap();

        assert_eq!(notices.active().len(), 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(notices.active().is_empty());
    }
}
