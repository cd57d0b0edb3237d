//! End-to-end session scenarios: scripted meter bytes in, snapshot and health out

mod common;

use common::*;
use dlms_core::{DataObject, ObisCode, Unit};
use dlms_listener::{Health, SessionState};
use dlms_mapper::RegisterValue;
use dlms_security::SecurityKeys;
use std::time::Duration;
use tokio_test::io::Builder;
use tokio_util::sync::CancellationToken;

/// Truncated data-notification: the invoke id is cut short
const UNDECODABLE: [u8; 3] = [0x0F, 0x00, 0x00];

fn gaps(instants: &[tokio::time::Instant]) -> Vec<Duration> {
    instants.windows(2).map(|w| w[1] - w[0]).collect()
}

async fn next_attempts(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<tokio::time::Instant>,
    count: usize,
) -> Vec<tokio::time::Instant> {
    let mut attempts = Vec::with_capacity(count);
    for _ in 0..count {
        attempts.push(rx.recv().await.unwrap());
    }
    attempts
}

#[tokio::test]
async fn corrupted_frame_is_skipped_and_next_telegram_decoded() {
    let mut corrupted = frame(&power_notification(100));
    let last_information_byte = corrupted.len() - 4;
    corrupted[last_information_byte] ^= 0xFF;

    let mut bytes = corrupted;
    bytes.extend_from_slice(&frame(&power_notification(250)));
    let mock = Builder::new().read(&bytes).build();
    let (connector, _attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], true);
    let (controller, handle) = controller(connector, SecurityKeys::none());

    controller.run(CancellationToken::new()).await;

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.number("ACTIVE_POWER_IMPORT"), Some(250.0));
    let status = handle.status();
    assert_eq!(status.framing.fcs_errors, 1);
    assert_eq!(status.telegrams_ok, 1);
    assert_eq!(status.telegrams_failed, 1);
    assert_eq!(status.state, SessionState::Disconnected);
}

#[tokio::test]
async fn two_frame_telegram_is_reassembled_before_decoding() {
    let build = |pad: usize| {
        notification(vec![
            entry(
                ObisCode::new(0, 0, 96, 1, 0, 255),
                DataObject::VisibleString(vec![b'A'; pad]),
                None,
            ),
            entry(
                ObisCode::new(1, 0, 1, 8, 0, 255),
                DataObject::Unsigned32(123_456),
                Some((-2, Unit::WattHour)),
            ),
        ])
    };
    let apdu = (0..256).map(build).find(|apdu| apdu.len() == 192).unwrap();

    let frames = segmented(&apdu, 128);
    assert_eq!(frames.len(), 2);
    let mock = Builder::new().read(&frames[0]).read(&frames[1]).build();
    let (connector, _attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], true);
    let (controller, handle) = controller(connector, SecurityKeys::none());

    controller.run(CancellationToken::new()).await;

    let snapshot = handle.snapshot().unwrap();
    let energy = snapshot.get("ACTIVE_ENERGY_IMPORT").unwrap();
    assert!((energy.value.as_f64().unwrap() - 1234.56).abs() < 1e-9);
    assert_eq!(energy.unit.as_deref(), Some("Wh"));
    match snapshot.value("SERIAL") {
        Some(RegisterValue::Text(serial)) => assert!(serial.bytes().all(|b| b == b'A')),
        other => panic!("unexpected serial {other:?}"),
    }

    let framing = handle.status().framing;
    assert_eq!(framing.frames_received, 2);
    assert_eq!(framing.apdus_emitted, 1);
}

#[tokio::test]
async fn ciphered_telegrams_and_bad_tags() {
    let good = protect(&power_notification(300), 1);
    let mut forged = protect(&power_notification(999), 2);
    let tag_byte = forged.len() - 1;
    forged[tag_byte] ^= 0x01;

    let mut bytes = frame(&good);
    bytes.extend_from_slice(&frame(&forged));
    bytes.extend_from_slice(&frame(&forged));
    let mock = Builder::new().read(&bytes).build();
    let (connector, _attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], true);
    let (controller, handle) = controller(connector, keys());

    controller.run(CancellationToken::new()).await;

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.number("ACTIVE_POWER_IMPORT"), Some(300.0));
    let status = handle.status();
    assert_eq!(status.telegrams_ok, 1);
    assert_eq!(status.telegrams_failed, 2);
    assert_eq!(status.snapshot_sequence, 1);
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn unknown_obis_codes_are_skipped() {
    let apdu = notification(vec![
        entry(
            ObisCode::new(1, 0, 99, 99, 0, 255),
            DataObject::Unsigned16(7),
            Some((0, Unit::Watt)),
        ),
        entry(
            ObisCode::new(1, 0, 1, 8, 0, 255),
            DataObject::Unsigned32(5_000),
            Some((0, Unit::WattHour)),
        ),
    ]);
    let mock = Builder::new().read(&frame(&apdu)).build();
    let (connector, _attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], true);
    let (controller, handle) = controller(connector, SecurityKeys::none());

    controller.run(CancellationToken::new()).await;

    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.number("ACTIVE_ENERGY_IMPORT"), Some(5_000.0));
    assert_eq!(snapshot.unmatched, 1);
    assert_eq!(handle.status().telegrams_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_decode_failures_fault_the_session_until_a_telegram_succeeds() {
    let mut bad = Vec::new();
    for _ in 0..5 {
        bad.extend_from_slice(&frame(&UNDECODABLE));
    }
    let mock = Builder::new()
        .read(&bad)
        .wait(Duration::from_secs(1))
        .read(&frame(&power_notification(42)))
        .wait(Duration::from_secs(1))
        .build();
    let (connector, _attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], true);
    let (controller, handle) = controller(connector, SecurityKeys::none());
    let mut status = handle.subscribe();

    let session = tokio::spawn(controller.run(CancellationToken::new()));

    status
        .wait_for(|s| s.health == Health::DegradedFaulted)
        .await
        .unwrap();
    assert_eq!(handle.state(), SessionState::Faulted);
    assert_eq!(handle.status().telegrams_failed, 5);
    assert!(handle.snapshot().is_none());

    status
        .wait_for(|s| s.health == Health::Healthy && s.telegrams_ok == 1)
        .await
        .unwrap();
    assert_eq!(handle.snapshot().unwrap().number("ACTIVE_POWER_IMPORT"), Some(42.0));

    session.await.unwrap();
    assert_eq!(handle.health(), Health::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn failed_opens_back_off_exponentially_up_to_the_cap() {
    let (connector, mut attempts) = ScriptedConnector::new(Vec::new(), false);
    let (controller, handle) = controller(connector, SecurityKeys::none());
    let cancel = CancellationToken::new();
    let session = tokio::spawn(controller.run(cancel.clone()));

    let instants = next_attempts(&mut attempts, 6).await;
    assert_eq!(
        gaps(&instants),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ]
    );
    assert_eq!(handle.health(), Health::Disconnected);
    assert!(handle.status().last_error.unwrap().contains("no such device"));

    cancel.cancel();
    session.await.unwrap();
    assert_eq!(handle.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn device_removal_keeps_the_snapshot_and_reconnects_with_backoff() {
    let mock = Builder::new()
        .read(&frame(&power_notification(1_500)))
        .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device removed"))
        .build();
    let (connector, mut attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], false);
    let (controller, handle) = controller(connector, SecurityKeys::none());
    let cancel = CancellationToken::new();
    let session = tokio::spawn(controller.run(cancel.clone()));

    let instants = next_attempts(&mut attempts, 4).await;
    assert_eq!(
        gaps(&instants),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
        ]
    );
    assert_eq!(handle.snapshot().unwrap().number("ACTIVE_POWER_IMPORT"), Some(1_500.0));
    assert_eq!(handle.status().telegrams_ok, 1);

    cancel.cancel();
    session.await.unwrap();
    assert_eq!(handle.health(), Health::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn faulted_session_reopens_the_link_periodically() {
    let mut bad = Vec::new();
    for _ in 0..5 {
        bad.extend_from_slice(&frame(&UNDECODABLE));
    }
    let mock = Builder::new()
        .read(&bad)
        .wait(Duration::from_secs(60))
        .build();
    let (connector, mut attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], false);
    let config = dlms_listener::ListenerConfig {
        faulted_reconnect_ms: 10_000,
        ..common::config()
    };
    let (controller, handle) = controller_with_config(connector, SecurityKeys::none(), config);
    let cancel = CancellationToken::new();
    let session = tokio::spawn(controller.run(cancel.clone()));

    let instants = next_attempts(&mut attempts, 2).await;
    // faulted reconnect interval plus the first backoff step
    assert_eq!(gaps(&instants), vec![Duration::from_secs(11)]);
    // still faulted while the link is reopened
    assert!(!handle.state().is_connected());
    assert_eq!(handle.health(), Health::DegradedFaulted);

    cancel.cancel();
    session.await.unwrap();
    assert_eq!(handle.status().telegrams_failed, 5);
    assert_eq!(handle.health(), Health::DegradedFaulted);
}

#[tokio::test]
async fn cancellation_while_listening_closes_the_link() {
    let mock = Builder::new()
        .read(&frame(&power_notification(10)))
        .wait(Duration::from_secs(3_600))
        .build();
    let (connector, _attempts) = ScriptedConnector::new(vec![Link::Stream(mock)], false);
    let (controller, handle) = controller(connector, SecurityKeys::none());
    let mut status = handle.subscribe();
    let cancel = CancellationToken::new();
    let session = tokio::spawn(controller.run(cancel.clone()));

    status.wait_for(|s| s.telegrams_ok == 1).await.unwrap();
    assert_eq!(handle.health(), Health::Healthy);

    cancel.cancel();
    session.await.unwrap();
    assert_eq!(handle.state(), SessionState::Disconnected);
    assert_eq!(handle.health(), Health::Disconnected);
}
