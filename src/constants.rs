//! Constants used throughout the application

use std::time::Duration;

/// Capacity of every stage-to-stage channel in the reference deployment
pub const DEFAULT_CHANNEL_CAPACITY: usize = 2;

/// Horizontal dead-zone exclusion proportion
pub const TARGET_HORIZONTAL_EXCLUSION_PROPORTION: f64 = 0.3;
pub const MAX_HORIZONTAL_ROTATION: f64 = 30.0;
pub const MIN_HORIZONTAL_ROTATION: f64 = 1.0;

/// Vertical dead-zone exclusion proportion
pub const TARGET_VERTICAL_EXCLUSION_PROPORTION: f64 = 0.20;
pub const MAX_VERTICAL_ROTATION: f64 = 30.0;
pub const MIN_VERTICAL_ROTATION: f64 = 1.0;

/// Target share of the frame covered by the tracked region
pub const TARGET_AREA_PROPORTION: f64 = 0.15;
pub const TARGET_AREA_PROPORTION_TOLERANCE: f64 = 0.05;
pub const MAX_FORWARD_DISPLACEMENT: f64 = 20.0;
pub const MIN_FORWARD_DISPLACEMENT: f64 = 0.5;

/// Minimum spacing between two transmitted motion commands
pub const TRANSMISSION_MIN_DELAY: Duration = Duration::from_millis(100);

/// Decimal places used when encoding motion commands as text
pub const DEFAULT_WIRE_PRECISION: usize = 2;

/// Largest payload the wireless medium accepts (ESP-NOW frame body)
pub const MAX_PAYLOAD_LEN: usize = 250;

/// Token broadcast by the mobile base while it looks for the camera
pub const IDENTIFICATION_TOKEN: &[u8] = b"ARDUINO_ALVIK_CAMERA_ROBOT_:D\0";

/// Token the camera answers with once it has bound the base
pub const ACKNOWLEDGEMENT_TOKEN: &[u8] = b"ARDUINO_ALVIK_CAMERA_FACEDETECTOR_:P\0";

/// Default UDP port for the host link
pub const DEFAULT_LINK_PORT: u16 = 47_800;

/// Poll interval of the analysis worker
pub const DEFAULT_ANALYSIS_INTERVAL: Duration = Duration::from_millis(10);

/// Reference panel resolution of the display collaborator
pub const DEFAULT_PANEL_WIDTH: u32 = 240;
pub const DEFAULT_PANEL_HEIGHT: u32 = 240;

/// Base side: how long the handshake may take before giving up
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Base side: silence after which the base holds position
pub const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(1000);
