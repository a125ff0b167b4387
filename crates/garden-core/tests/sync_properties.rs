//! End-to-end behaviour of the synchronization core.
//!
//! Property tests for the merge model plus scenarios that run a session over
//! a real record store file.

use std::sync::Arc;

use proptest::prelude::*;

use garden_core::{
    Config, ConnectionStatus, Control, DeviceSnapshot, Diagnostics, Mode, NoticeLevel,
    OutboundCommand, RecordTransport, SendError, Session, SnapshotPatch, StateStore,
};
use garden_store::Store;

fn field<T, S>(value: S) -> impl Strategy<Value = Option<Option<T>>>
where
    T: std::fmt::Debug + Clone,
    S: Strategy<Value = T>,
{
    prop::option::of(prop::option::of(value))
}

prop_compose! {
    fn patch()(
        mode in field(prop_oneof![Just(Mode::Auto), Just(Mode::Manual), Just(Mode::Unknown)]),
        pump_on in field(any::<bool>()),
        air_temp in field(-40.0f64..60.0),
        water_level in field(0i64..4096),
        city in field("[A-Za-z]{1,10}"),
    ) -> SnapshotPatch {
        SnapshotPatch {
            mode,
            pump_on,
            air_temp,
            water_level,
            city,
            ..Default::default()
        }
    }
}

/// Field-wise last-writer-wins, written out by hand.
fn expected_snapshot(patches: &[SnapshotPatch]) -> DeviceSnapshot {
    let mut expected = DeviceSnapshot::default();
    for p in patches {
        if let Some(v) = p.mode {
            expected.mode = v;
        }
        if let Some(v) = p.pump_on {
            expected.pump_on = v;
        }
        if let Some(v) = p.air_temp {
            expected.air_temp = v;
        }
        if let Some(v) = p.water_level {
            expected.water_level = v;
        }
        if let Some(v) = &p.city {
            expected.city = v.clone();
        }
    }
    expected
}

proptest! {
    #[test]
    fn merge_is_last_writer_wins_per_field(patches in prop::collection::vec(patch(), 0..24)) {
        let store = StateStore::new();
        for p in &patches {
            store.apply_update(p);
        }
        prop_assert_eq!(store.current_view().snapshot, expected_snapshot(&patches));
    }

    #[test]
    fn merge_is_independent_of_batching(
        patches in prop::collection::vec(patch(), 1..24),
        split in any::<prop::sample::Index>(),
    ) {
        let one_by_one = StateStore::new();
        for p in &patches {
            one_by_one.apply_update(p);
        }

        // fold the first part into a single frame, then apply the rest
        let at = split.index(patches.len());
        let batched = StateStore::new();
        let head = patches[..at]
            .iter()
            .fold(SnapshotPatch::default(), |acc, p| acc.then(p));
        batched.apply_update(&head);
        for p in &patches[at..] {
            batched.apply_update(p);
        }

        prop_assert_eq!(
            one_by_one.current_view().snapshot,
            batched.current_view().snapshot
        );
    }

    #[test]
    fn data_flag_requires_a_present_field(patches in prop::collection::vec(patch(), 0..12)) {
        let store = StateStore::new();
        store.mark_connected();
        for p in &patches {
            store.apply_update(p);
        }

        let any_field = patches.iter().any(|p| !p.is_empty());
        let expected = if any_field {
            ConnectionStatus::ConnectedWithData
        } else {
            ConnectionStatus::ConnectedNoData
        };
        prop_assert_eq!(store.status(), expected);
    }
}

fn store_session(store: Store) -> Session {
    let transport = RecordTransport::from_store(store, "main_status", Arc::new(Diagnostics::new()));
    Session::with_transport(Config::default(), Arc::new(transport))
}

#[tokio::test]
async fn empty_record_is_connected_without_data() {
    let store = Store::open_in_memory().unwrap();
    store.write_document("main_status", "{}").unwrap();
    let mut session = store_session(store);

    session.sync(true).await;
    let frame = session.frame();
    assert_eq!(frame.view.status, ConnectionStatus::ConnectedNoData);
    assert!(frame.snapshot().is_empty());
    assert!(frame.video_url.is_none());
}

#[tokio::test]
async fn manual_pump_on_waits_for_device_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.db");
    let device = Store::open(&path).unwrap();
    device
        .write_status(
            "main_status",
            &DeviceSnapshot {
                mode: Some(Mode::Manual),
                pump_on: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    let mut session = store_session(Store::open(&path).unwrap());
    session.sync(true).await;

    session.actions().send(Control::PumpOn);
    let outcomes = session.dispatch_pending().await;
    assert!(outcomes[0].is_ok());

    // nothing changes locally until the next read
    let view = session.state().current_view();
    assert_eq!(view.snapshot.pump_on, Some(false));
    assert!(view.snapshot.command.is_none());

    // the controller sees the mailbox
    let record = device.find_status("main_status").unwrap().unwrap();
    assert_eq!(record.snapshot.staged_command(), Some(OutboundCommand::PumpOn));

    // the controller acts on it and clears the mailbox
    device
        .write_status(
            "main_status",
            &DeviceSnapshot {
                mode: Some(Mode::Manual),
                pump_on: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
    session.sync(true).await;
    assert_eq!(session.state().current_view().snapshot.pump_on, Some(true));
}

#[tokio::test]
async fn pump_command_in_auto_mode_never_reaches_the_store() {
    let store = Store::open_in_memory().unwrap();
    store
        .write_status(
            "main_status",
            &DeviceSnapshot {
                mode: Some(Mode::Auto),
                ..Default::default()
            },
        )
        .unwrap();
    let mut session = store_session(store);
    session.sync(true).await;

    let err = session.dispatch(OutboundCommand::PumpOff).await.unwrap_err();
    assert!(matches!(err, SendError::ModeRestricted { mode: Mode::Auto, .. }));
    assert!(err.is_local_rejection());
    assert_eq!(session.diagnostics().snapshot().commands_rejected, 1);
    assert_eq!(session.diagnostics().snapshot().commands_sent, 0);

    session.sync(true).await;
    assert!(session.state().current_view().snapshot.command.is_none());
}

#[tokio::test]
async fn malformed_record_keeps_last_good_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("status.db");
    let device = Store::open(&path).unwrap();
    device
        .write_status(
            "main_status",
            &DeviceSnapshot {
                air_temp: Some(19.5),
                ..Default::default()
            },
        )
        .unwrap();

    let diagnostics = Arc::new(Diagnostics::new());
    let transport = RecordTransport::from_store(
        Store::open(&path).unwrap(),
        "main_status",
        Arc::clone(&diagnostics),
    );
    let mut session = Session::with_transport(Config::default(), Arc::new(transport));
    session.sync(true).await;

    device
        .write_document("main_status", r#"{"air_temp": "warm"}"#)
        .unwrap();
    session.sync(true).await;

    let view = session.state().current_view();
    assert_eq!(view.snapshot.air_temp, Some(19.5));
    assert_eq!(view.status, ConnectionStatus::ConnectedWithData);
    assert_eq!(diagnostics.decode_failures(), 1);
}

#[tokio::test]
async fn send_while_disconnected_leaves_state_untouched() {
    let mut config = Config::default();
    config.transport.store.url = Some("mongodb://localhost:27017".into());
    let session = Session::start(config).await;

    let before = session.state().current_view();
    assert_eq!(
        session.dispatch(OutboundCommand::ToggleMode).await,
        Err(SendError::Disconnected)
    );
    assert_eq!(session.state().current_view(), before);

    let levels: Vec<_> = session.notices().active().iter().map(|n| n.level).collect();
    assert_eq!(levels, vec![NoticeLevel::Unavailable, NoticeLevel::Error]);
}
