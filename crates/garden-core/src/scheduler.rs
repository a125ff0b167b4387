//! The refresh cycle.
//!
//! One cycle is: synchronize the session, render, dispatch the user actions
//! queued since the last cycle, then wait. Cycles never overlap; the wait is
//! the only point where the loop suspends for long.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::RefreshConfig;
use crate::render::Render;
use crate::session::Session;
use crate::transport::TransportKind;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerState {
    /// Between cycles.
    #[default]
    Idle,
    /// Waiting for the next wake.
    Waiting,
    /// Synchronizing, rendering and dispatching.
    Refreshing,
}

/// What ends a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakePolicy {
    /// Wake on a fixed interval (pull transports).
    Timer(Duration),
    /// Wake when an update arrives, or after `fallback` if none does
    /// (push transports).
    OnUpdate { fallback: Duration },
}

impl WakePolicy {
    /// The policy for a transport kind. Sessions without a transport poll
    /// on the regular interval so notices keep refreshing.
    pub fn for_transport(kind: Option<TransportKind>, refresh: &RefreshConfig) -> Self {
        match kind {
            Some(TransportKind::Push) => WakePolicy::OnUpdate {
                fallback: refresh.push_fallback(),
            },
            Some(TransportKind::Pull) | None => WakePolicy::Timer(refresh.interval()),
        }
    }

    /// Longest time a wait can last.
    pub fn period(&self) -> Duration {
        match self {
            WakePolicy::Timer(interval) => *interval,
            WakePolicy::OnUpdate { fallback } => *fallback,
        }
    }

    pub fn wakes_on_update(&self) -> bool {
        matches!(self, WakePolicy::OnUpdate { .. })
    }
}

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// First cycle of a run.
    Start,
    /// The timer ran out.
    Timer,
    /// An update arrived on the push channel.
    Update,
    /// A user action was queued.
    Action,
    /// The session is shutting down.
    Cancelled,
}

impl Wake {
    /// Whether the cycle should actively ask the transport for data.
    ///
    /// Pull transports fetch every cycle anyway; this decides whether a push
    /// transport is asked to redeliver the retained status.
    pub fn requests_fetch(self) -> bool {
        matches!(self, Wake::Start | Wake::Timer)
    }
}

/// Drives the refresh cycle of one session.
#[derive(Debug)]
pub struct RefreshScheduler {
    policy: WakePolicy,
    state: watch::Sender<SchedulerState>,
    cycles: u64,
}

impl RefreshScheduler {
    pub fn new(policy: WakePolicy) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            policy,
            state,
            cycles: 0,
        }
    }

    /// A scheduler using the policy the session's transport calls for.
    pub fn for_session(session: &Session) -> Self {
        Self::new(session.wake_policy())
    }

    pub fn policy(&self) -> WakePolicy {
        self.policy
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until the session is cancelled.
    ///
    /// The first cycle starts immediately. A cycle in progress always runs to
    /// the end; cancellation is only observed while waiting.
    pub async fn run<R>(&mut self, session: &mut Session, renderer: &mut R)
    where
        R: Render + ?Sized,
    {
        let cancel = session.cancel_token();
        info!("Refresh cycle started ({:?})", self.policy);

        let mut wake = Wake::Start;
        while !cancel.is_cancelled() {
            self.cycle(session, renderer, wake).await;

            self.set_state(SchedulerState::Waiting);
            wake = session.wait_for_wake(&self.policy).await;
            debug!("Woke: {:?}", wake);
        }

        self.set_state(SchedulerState::Idle);
        info!("Refresh cycle stopped after {} cycles", self.cycles);
    }

    /// Run a single cycle.
    pub async fn cycle<R>(&mut self, session: &mut Session, renderer: &mut R, wake: Wake)
    where
        R: Render + ?Sized,
    {
        self.set_state(SchedulerState::Refreshing);

        session.sync(wake.requests_fetch()).await;
        renderer.render(&session.frame());

        let outcomes = session.dispatch_pending().await;
        if !outcomes.is_empty() {
            // show the acknowledgments without waiting a full period
            renderer.render(&session.frame());
        }

        self.cycles += 1;
        self.set_state(SchedulerState::Idle);
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use garden_types::{DeviceSnapshot, Mode, OutboundCommand, SnapshotPatch};

    use super::*;
    use crate::config::Config;
    use crate::dispatch::Control;
    use crate::mock::MockTransport;
    use crate::render::Frame;
    use crate::transport::TransportEvent;

    fn refresh(interval: u64, push_fallback: u64) -> RefreshConfig {
        RefreshConfig {
            interval,
            push_fallback,
        }
    }

    #[test]
    fn test_policy_for_transport() {
        let config = refresh(3, 30);
        assert_eq!(
            WakePolicy::for_transport(Some(TransportKind::Pull), &config),
            WakePolicy::Timer(Duration::from_secs(3))
        );
        assert_eq!(
            WakePolicy::for_transport(Some(TransportKind::Push), &config),
            WakePolicy::OnUpdate {
                fallback: Duration::from_secs(30)
            }
        );
        assert_eq!(
            WakePolicy::for_transport(None, &config).period(),
            Duration::from_secs(3)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_cycles_follow_timer() {
        let transport = Arc::new(MockTransport::pull());
        transport.set_snapshot(DeviceSnapshot {
            air_temp: Some(22.5),
            ..Default::default()
        });
        let mut session = Session::with_transport(Config::default(), transport.clone());
        let mut scheduler = RefreshScheduler::for_session(&session);
        let cancel = session.cancel_token();

        let mut frames = Vec::new();
        let mut renderer = |frame: &Frame| {
            frames.push(frame.view.snapshot.air_temp);
            if frames.len() == 3 {
                cancel.cancel();
            }
        };

        let start = tokio::time::Instant::now();
        scheduler.run(&mut session, &mut renderer).await;

        assert_eq!(frames, vec![Some(22.5); 3]);
        assert_eq!(transport.fetch_count(), 3);
        // first cycle is immediate, then two 3s waits
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(scheduler.cycles(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_update_wakes_before_fallback() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());
        let mut scheduler = RefreshScheduler::for_session(&session);
        assert!(scheduler.policy().wakes_on_update());

        let feeder = Arc::clone(&transport);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            feeder.push_update(SnapshotPatch {
                water_level: Some(Some(512)),
                ..Default::default()
            });
        });

        let cancel = session.cancel_token();
        let mut seen = Vec::new();
        let mut renderer = |frame: &Frame| {
            seen.push(frame.view.snapshot.water_level);
            if frame.view.snapshot.water_level.is_some() {
                cancel.cancel();
            }
        };

        let start = tokio::time::Instant::now();
        scheduler.run(&mut session, &mut renderer).await;

        assert_eq!(seen, vec![None, Some(512)]);
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_fallback_requests_redelivery() {
        let transport = Arc::new(MockTransport::push());
        let mut session = Session::with_transport(Config::default(), transport.clone());
        let mut scheduler = RefreshScheduler::for_session(&session);

        let cancel = session.cancel_token();
        let mut renders = 0;
        let mut renderer = |_: &Frame| {
            renders += 1;
            if renders == 2 {
                cancel.cancel();
            }
        };

        let start = tokio::time::Instant::now();
        scheduler.run(&mut session, &mut renderer).await;

        assert_eq!(start.elapsed(), Duration::from_secs(30));
        // once at start, once on the fallback timer
        assert_eq!(transport.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_wakes_and_dispatches_once() {
        let transport = Arc::new(MockTransport::pull());
        transport.set_snapshot(DeviceSnapshot {
            mode: Some(Mode::Manual),
            pump_on: Some(false),
            ..Default::default()
        });
        let mut session = Session::with_transport(Config::default(), transport.clone());
        let mut scheduler = RefreshScheduler::for_session(&session);
        let actions = session.actions();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            actions.send(Control::PumpOn);
        });

        let cancel = session.cancel_token();
        let mut renderer = |frame: &Frame| {
            if !frame.notices.is_empty() {
                cancel.cancel();
            }
        };
        scheduler.run(&mut session, &mut renderer).await;

        assert_eq!(transport.published(), vec![OutboundCommand::PumpOn]);
        // wait-for-confirmation: pump state still as the device reported it
        assert_eq!(session.state().current_view().snapshot.pump_on, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let transport = Arc::new(MockTransport::push());
        transport.push_event(TransportEvent::Ready);
        let mut session = Session::with_transport(Config::default(), transport);
        let mut scheduler = RefreshScheduler::for_session(&session);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let states = scheduler.watch_state();
        let cancel = session.cancel_token();
        let mut during_render = Vec::new();
        let mut renderer = |_: &Frame| {
            during_render.push(*states.borrow());
            cancel.cancel();
        };
        scheduler.run(&mut session, &mut renderer).await;

        assert_eq!(during_render, vec![SchedulerState::Refreshing]);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(session.state().status(), garden_types::ConnectionStatus::ConnectedNoData);
    }
}
