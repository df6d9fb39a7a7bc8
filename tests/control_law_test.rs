//! End-to-end tests of the control laws on real frames


use test_helpers::frame_with_box;
use tracking_head::{
    control::{remap, ControlLaw, MotionCommand},
    detection::{aggregate_region, BoundingBox, BrightRegionDetector, Detection, Detector},
};

const TOL: f64 = 1e-9;

fn command_for_box(bbox: BoundingBox) -> Option<MotionCommand> {
    let frame = frame_with_box(200, 200, bbox);
    let mut detector = BrightRegionDetector::new(128, 1, 1).unwrap();
    let detections = detector.detect(&frame).unwrap();
    ControlLaw::default().command_for(&detections, frame.width(), frame.height()).unwrap()
}

#[test]
fn test_remap_reference_values() {
    assert!((remap(5.0, 0.0, 10.0, 0.0, 100.0) - 50.0).abs() < TOL);
    assert!((remap(0.1, 0.0, 0.3, -30.0, -1.0) + (30.0 - 29.0 / 3.0)).abs() < TOL);
    assert!((remap(0.05, 0.0, 0.10, 20.0, 0.5) - 10.25).abs() < TOL);
}

#[test]
fn test_centered_face_at_target_distance_holds() {
    // 80x80 of 200x200 is 16% of the frame, inside 0.15 +/- 0.05
    let command = command_for_box(BoundingBox::new(60, 60, 140, 140)).unwrap();
    assert_eq!(command, MotionCommand::HOLD);
}

#[test]
fn test_face_near_right_border_turns_right() {
    let command = command_for_box(BoundingBox::new(150, 80, 200, 120)).unwrap();
    assert!(command.horizontal_rotation > 0.0);
    assert!(command.horizontal_rotation <= 30.0);
    assert_eq!(command.vertical_rotation, 0.0);
}

#[test]
fn test_face_near_top_tilts_up() {
    let command = command_for_box(BoundingBox::new(80, 0, 120, 30)).unwrap();
    assert!(command.vertical_rotation < 0.0);
    assert_eq!(command.horizontal_rotation, 0.0);
}

#[test]
fn test_small_face_approaches_large_face_retreats() {
    let small = command_for_box(BoundingBox::new(90, 90, 110, 110)).unwrap();
    assert!(small.forward_displacement > 0.0);

    let large = command_for_box(BoundingBox::new(45, 45, 155, 155)).unwrap();
    assert!(large.forward_displacement < 0.0);
    assert!(large.forward_displacement >= -20.0);
}

#[test]
fn test_blank_frame_gives_no_command() {
    let frame = frame_with_box(64, 64, BoundingBox::new(0, 0, 0, 0));
    let detections = BrightRegionDetector::default().detect(&frame).unwrap();
    assert!(detections.is_empty());
    assert!(ControlLaw::default().command_for(&detections, 64, 64).unwrap().is_none());
}

#[test]
fn test_several_faces_steer_on_their_union() {
    let detections = vec![
        Detection::new(BoundingBox::new(0, 90, 10, 110), 0.8),
        Detection::new(BoundingBox::new(190, 90, 200, 110), 0.7),
    ];
    assert_eq!(aggregate_region(&detections), Some(BoundingBox::new(0, 90, 200, 110)));

    // The union touches both borders; the low border wins
    let command = ControlLaw::default().command_for(&detections, 200, 200).unwrap().unwrap();
    assert!((command.horizontal_rotation + 30.0).abs() < TOL);
}
