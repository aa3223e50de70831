use std::io::Cursor;
use std::time::{Duration, Instant};

use groundlink_core::pipeline::{Diagnostic, LinkEvent};
use groundlink_core::stages::MissionStage;
use groundlink_rust::GroundClient;
use groundlink_rust::replay::ReplayTransport;
use groundlink_rust::reporter::TelemetryReporter;

const CAPTURE: &str = "ACK|link up\r\n\
    IMG|cam0.jpg|32\r\n\
    IMG_START\r\n\
    SGVsbG8s\r\n\
    IGdyb3Vu\r\n\
    ZCBzdGF0aW9uIQ==\r\n\
    IMG_END\r\n\
    S35.7,-78.6,12.0,1013.2,0.1,0.2,0.3,21.5,0,0,0,0\r\n\
    radio static\r\n\
    {\"latitude\":35.7,\"longitude\":-78.6,\"altitude\":450.0,\"launched\":true,\"target_altitude_reached\":1}\r\n\
    S35.7,-78.6,300.0,990.0,0.1,0.2,0.3,20.0,1,1,1,0\r\n\
    {\"latitude\":35.7,\"longitude\":-78.6,\"altitude\":4.0,\"launched\":1,\"instrument_released\":true}";

/// Replays `capture` unpaced and returns every event of the session.
fn replay_session(capture: &str, chunk_size: usize) -> (Vec<LinkEvent>, GroundClient) {
    let transport = ReplayTransport::new(
        Cursor::new(capture.as_bytes().to_vec()),
        chunk_size,
        Duration::ZERO,
        false,
    );
    let mut client = GroundClient::from_transport(Box::new(transport));
    client.start();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        match client.get_events(Some(Duration::from_millis(20))) {
            Ok(batch) => events.extend(batch),
            Err(_) if !client.is_running() => break,
            Err(_) => {}
        }
    }
    client.stop();
    // Anything sent between the last poll and the thread exiting
    events.extend(client.get_events(None).unwrap());
    (events, client)
}

#[test]
fn test_replayed_capture_decodes_full_session() {
    let (events, client) = replay_session(CAPTURE, 16);

    assert_eq!(events[0], LinkEvent::Acknowledgement("link up".to_string()));

    let image = events
        .iter()
        .find_map(|event| match event {
            LinkEvent::ImageReceived(image) => Some(image),
            _ => None,
        })
        .expect("image event");
    assert_eq!(image.bytes, b"Hello, ground station!");
    assert_eq!(image.filename.as_deref(), Some("cam0.jpg"));
    assert_eq!(image.declared_size, Some(32));

    let altitudes: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            LinkEvent::Telemetry(record) => Some(record.altitude),
            _ => None,
        })
        .collect();
    // The final unterminated line is flushed when the replay ends
    assert_eq!(altitudes, vec![12.0, 450.0, 300.0, 4.0]);

    let stages: Vec<MissionStage> = events
        .iter()
        .filter_map(|event| match event {
            LinkEvent::StageActivated(stage) => Some(*stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            MissionStage::Launched,
            MissionStage::TargetAltitudeReached,
            MissionStage::ParachuteReleased,
            MissionStage::InstrumentReleased,
        ]
    );

    assert!(events.contains(&LinkEvent::Diagnostic(Diagnostic::Noise(
        "radio static".to_string()
    ))));

    let stats = client.last_session_stats().unwrap();
    assert_eq!(stats.bytes, CAPTURE.len() as u64);
    assert_eq!(stats.telemetry_records, 4);
    assert_eq!(stats.images, 1);
    assert_eq!(stats.diagnostics, 1);
}

#[test]
fn test_chunk_size_does_not_change_events() {
    // Debug text, since absent readings are NaN
    let (expected, _) = replay_session(CAPTURE, 1024);
    let expected = format!("{expected:?}");
    for chunk_size in [1, 3, 7, 50] {
        let (events, _) = replay_session(CAPTURE, chunk_size);
        assert_eq!(format!("{events:?}"), expected, "chunk size {chunk_size}");
    }
}

#[test]
fn test_capture_ending_mid_image_yields_no_image() {
    let (events, client) = replay_session("IMG_START\nSGVsbG8s\nIGdyb3Vu\n", 8);

    assert_eq!(
        events,
        vec![
            LinkEvent::ImageStarted,
            LinkEvent::Diagnostic(Diagnostic::ImageInterrupted { discarded_chars: 16 }),
        ]
    );
    assert_eq!(client.last_session_stats().unwrap().images, 0);
}

#[test]
fn test_mock_device_session() {
    let (mut client, device) = GroundClient::new_mock(Duration::from_millis(10));
    client.start();

    let record = "S0,0,50.0,1000.0,0,0,0,20.0,1,0,0,0";
    device.send_line(record);
    device.send_line(record);
    device.send_line("ERR|camera busy");
    client.send_command("SNAP").unwrap();

    assert_eq!(
        device.wait_written(Duration::from_secs(1)).unwrap(),
        b"CMD|SNAP\r\n"
    );

    let deadline = Instant::now() + Duration::from_secs(1);
    let mut events = Vec::new();
    while events.len() < 4 && Instant::now() < deadline {
        if let Ok(batch) = client.get_events(Some(Duration::from_millis(50))) {
            events.extend(batch);
        }
    }

    let LinkEvent::Telemetry(first) = &events[0] else {
        panic!("expected telemetry, got {:?}", events[0]);
    };
    // 0,0 is the no-fix sentinel
    assert!(!first.has_position_fix());
    assert_eq!(events[1], LinkEvent::StageActivated(MissionStage::Launched));
    assert!(matches!(events[2], LinkEvent::Telemetry(_)));
    assert_eq!(events[3], LinkEvent::DeviceError("camera busy".to_string()));
}

#[test]
fn test_unreachable_backend_does_not_stall_decoding() {
    // Nothing listens on port 9; every post fails
    let reporter =
        TelemetryReporter::spawn("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
    let (client, device) = GroundClient::new_mock(Duration::from_millis(10));
    let mut client = client.with_reporter(reporter);
    client.start();

    device.send_line("S0,0,10.0,1000.0,0,0,0,20.0,1,0,0,0");
    device.send_line("S0,0,900.0,900.0,0,0,0,15.0,1,1,0,0");
    device.send_line("S0,0,300.0,950.0,0,0,0,18.0,1,1,1,1");

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut events = Vec::new();
    while events.len() < 7 && Instant::now() < deadline {
        if let Ok(batch) = client.get_events(Some(Duration::from_millis(50))) {
            events.extend(batch);
        }
    }
    client.stop();

    let order: Vec<String> = events
        .iter()
        .map(|event| match event {
            LinkEvent::Telemetry(record) => format!("T{}", record.altitude),
            LinkEvent::StageActivated(stage) => format!("{stage:?}"),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        order,
        vec![
            "T10",
            "Launched",
            "T900",
            "TargetAltitudeReached",
            "T300",
            "ParachuteReleased",
            "InstrumentReleased",
        ]
    );
}
