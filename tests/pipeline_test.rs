//! Integration tests for the full stage pipeline


use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use test_helpers::{test_config, wait_until, FixedDetector, BASE, CAMERA};
use tracking_head::{
    display::LogDisplay,
    frame::PixelFormat,
    mode::OperatingMode,
    pipeline::Pipeline,
    receiver::CommandReceiver,
    source::SyntheticSource,
    transmission::MemoryMedium,
};

fn source() -> SyntheticSource {
    SyntheticSource::new(100, 100, PixelFormat::Gray8, 4).unwrap()
}

#[test]
fn test_every_frame_is_released_exactly_once() {
    let medium = MemoryMedium::new();
    let link = Arc::new(medium.join(CAMERA).unwrap());
    let source = source();
    let pool = source.pool().clone();
    let mut config = test_config(Some(20));
    config.pipeline.initial_mode = OperatingMode::TrackingActive;

    let head = Pipeline::launch(&config, source, FixedDetector::left_edge(), LogDisplay::default(), link).unwrap();
    let stats = head.join().unwrap();

    assert_eq!(stats.source.produced, 20);
    assert_eq!(stats.tracking.frames, 20);
    assert_eq!(stats.tracking.forwarded, 20);
    assert_eq!(stats.display.frames, 20);
    assert_eq!(stats.display.released, 20);
    assert_eq!(stats.display.shown, 20);
    assert_eq!(pool.acquired(), 20);
    assert_eq!(pool.released(), 20);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_empty_detections_enqueue_no_commands() {
    let medium = MemoryMedium::new();
    let link = Arc::new(medium.join(CAMERA).unwrap());
    let mut config = test_config(Some(15));
    config.pipeline.initial_mode = OperatingMode::TrackingActive;

    let head = Pipeline::launch(&config, source(), FixedDetector::empty(), LogDisplay::default(), link).unwrap();
    let stats = head.join().unwrap();

    assert_eq!(stats.tracking.inferences, 15);
    assert_eq!(stats.tracking.empty_results, 15);
    assert_eq!(stats.tracking.commands_sent, 0);
    assert_eq!(stats.transmission.commands, 0);
}

#[test]
fn test_stopped_mode_skips_detection_and_display() {
    let medium = MemoryMedium::new();
    let link = Arc::new(medium.join(CAMERA).unwrap());
    let detector = FixedDetector::left_edge();
    let calls = detector.calls();
    let source = source();
    let pool = source.pool().clone();

    let head = Pipeline::launch(&test_config(Some(10)), source, detector, LogDisplay::default(), link).unwrap();
    let stats = head.join().unwrap();

    assert_eq!(calls.load(Ordering::Acquire), 0);
    assert_eq!(stats.tracking.frames, 10);
    assert_eq!(stats.display.shown, 0);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_display_only_shows_without_tracking() {
    let medium = MemoryMedium::new();
    let link = Arc::new(medium.join(CAMERA).unwrap());
    let mut config = test_config(Some(8));
    config.pipeline.initial_mode = OperatingMode::DisplayOnly;

    let head = Pipeline::launch(&config, source(), FixedDetector::left_edge(), LogDisplay::default(), link).unwrap();
    let stats = head.join().unwrap();

    assert_eq!(stats.tracking.inferences, 0);
    assert_eq!(stats.display.shown, 8);
}

#[test]
fn test_detections_reach_analysis() {
    let medium = MemoryMedium::new();
    let link = Arc::new(medium.join(CAMERA).unwrap());
    let mut config = test_config(Some(30));
    config.pipeline.initial_mode = OperatingMode::TrackingActive;

    let head = Pipeline::launch(&config, source(), FixedDetector::left_edge(), LogDisplay::default(), link).unwrap();
    let stats = head.join().unwrap();

    assert!(stats.analysis.sets >= 1);
    assert!(stats.analysis.sets <= 30);
    assert_eq!(stats.analysis.max_faces, 1);
}

#[test]
fn test_commands_reach_the_base() {
    let medium = MemoryMedium::new();
    let camera = Arc::new(medium.join(CAMERA).unwrap());
    let base = medium.join(BASE).unwrap();
    let mut config = test_config(None);
    config.pipeline.initial_mode = OperatingMode::TrackingActive;

    let head = Pipeline::launch(&config, source(), FixedDetector::left_edge(), LogDisplay::default(), camera).unwrap();

    let driver = thread::spawn(move || {
        let mut receiver = CommandReceiver::new(base).with_handshake_retry(Duration::from_millis(50));
        receiver.connect_within(Duration::from_secs(5)).unwrap();
        let mut commands = Vec::new();
        while commands.len() < 2 {
            if let Some(command) = receiver.poll(Duration::from_secs(5)).unwrap() {
                commands.push(command);
            }
        }
        commands
    });

    let commands = driver.join().unwrap();
    assert!(wait_until(Duration::from_secs(1), || head.peer() == Some(BASE)));
    for command in &commands {
        assert!((command.horizontal_rotation + 30.0).abs() < 1e-9);
        assert_eq!(command.vertical_rotation, 0.0);
        assert!(command.forward_displacement > 0.0);
    }

    let stats = head.shutdown().unwrap();
    assert!(stats.transmission.transmitted >= 2);
    assert!(stats.transmission.rate_limited > 0);
}
