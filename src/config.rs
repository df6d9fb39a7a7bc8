//! Configuration management for the tracking head

use crate::{
    constants::{
        DEFAULT_ANALYSIS_INTERVAL, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_LINK_PORT,
        DEFAULT_PANEL_HEIGHT, DEFAULT_PANEL_WIDTH, DEFAULT_SILENCE_TIMEOUT, DEFAULT_WIRE_PRECISION, MAX_PAYLOAD_LEN,
        TRANSMISSION_MIN_DELAY,
    },
    control::ControlLaw,
    detection::BrightRegionDetector,
    frame::PixelFormat,
    mode::OperatingMode,
    protocol::{CommandCodec, WireFields},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stage wiring
    pub pipeline: PipelineConfig,

    /// Dead-zone control laws
    pub control: ControlLaw,

    /// Camera side of the link
    pub transmission: TransmissionConfig,

    /// Base side of the link
    pub receiver: ReceiverConfig,

    /// Synthetic frame source
    pub source: SourceConfig,

    /// Bright-region detector
    pub detection: DetectionConfig,

    /// Panel geometry
    pub display: DisplayConfig,
}

/// Stage wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Slots in each frame channel
    pub frame_capacity: usize,

    /// Slots in the command channel
    pub command_capacity: usize,

    /// Outline detections on forwarded frames
    pub annotate: bool,

    /// Mode at startup
    pub initial_mode: OperatingMode,

    /// Analysis worker poll interval in milliseconds
    pub analysis_interval_ms: u64,
}

/// Camera side of the link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Local address to bind
    pub bind: IpAddr,

    /// UDP port the camera listens on
    pub port: u16,

    /// Broadcast address of the shared medium
    pub broadcast: IpAddr,

    /// Minimum spacing between transmitted commands in milliseconds
    pub min_delay_ms: u64,

    /// Decimal places per field
    pub precision: usize,

    /// Axes carried by each payload
    pub wire_fields: WireFields,
}

/// Base side of the link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Local address to bind
    pub bind: IpAddr,

    /// UDP port the base listens on
    pub port: u16,

    /// Give up the handshake after this many milliseconds
    pub connection_timeout_ms: u64,

    /// Re-broadcast the identification every this many milliseconds
    pub handshake_retry_ms: u64,

    /// Hold position after this many milliseconds without a command
    pub silence_timeout_ms: u64,
}

/// Synthetic frame source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,

    /// Frame buffers in the pool
    pub buffers: usize,

    /// Target framerate
    pub fps: u32,

    /// Stop after this many frames, run forever if unset
    pub frames: Option<u64>,
}

/// Bright-region detector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Luma at or above which a pixel counts as bright
    pub threshold: u8,

    /// Bright samples needed for a detection
    pub min_pixels: usize,

    /// Sampling step in pixels
    pub stride: u32,
}

/// Panel geometry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub panel_width: u32,
    pub panel_height: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_CHANNEL_CAPACITY,
            command_capacity: DEFAULT_CHANNEL_CAPACITY,
            annotate: true,
            initial_mode: OperatingMode::Stopped,
            analysis_interval_ms: DEFAULT_ANALYSIS_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_LINK_PORT,
            broadcast: IpAddr::from([255, 255, 255, 255]),
            min_delay_ms: TRANSMISSION_MIN_DELAY.as_millis() as u64,
            precision: DEFAULT_WIRE_PRECISION,
            wire_fields: WireFields::All,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_LINK_PORT + 1,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64,
            handshake_retry_ms: 1000,
            silence_timeout_ms: DEFAULT_SILENCE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            format: PixelFormat::Rgb565,
            buffers: 4,
            fps: 15,
            frames: None,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 200,
            min_pixels: 4,
            stride: 2,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            panel_width: DEFAULT_PANEL_WIDTH,
            panel_height: DEFAULT_PANEL_HEIGHT,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub const fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }
}

impl TransmissionConfig {
    /// Socket the camera binds
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Where a broadcast on this medium reaches `port`
    #[must_use]
    pub const fn broadcast_to(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.broadcast, port)
    }

    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// Codec matching these settings
    #[must_use]
    pub const fn codec(&self) -> CommandCodec {
        CommandCodec::new(self.precision, self.wire_fields, MAX_PAYLOAD_LEN)
    }
}

impl ReceiverConfig {
    /// Socket the base binds
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    #[must_use]
    pub const fn handshake_retry(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_ms)
    }

    #[must_use]
    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

impl SourceConfig {
    /// Time between two frames, zero when unpaced
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        if self.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.fps
        }
    }
}

impl DetectionConfig {
    /// Build the detector these settings describe
    ///
    /// # Errors
    ///
    /// Returns an error for a zero stride
    pub fn detector(&self) -> Result<BrightRegionDetector> {
        BrightRegionDetector::new(self.threshold, self.min_pixels, self.stride)
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.frame_capacity == 0 || self.pipeline.command_capacity == 0 {
            return Err(Error::ConfigError("Channel capacities must be greater than 0".to_string()));
        }
        if self.pipeline.analysis_interval_ms == 0 {
            return Err(Error::ConfigError("Analysis interval must be greater than 0".to_string()));
        }

        self.control.validate()?;

        if self.transmission.precision > 6 {
            return Err(Error::ConfigError("Wire precision must be at most 6 decimal places".to_string()));
        }
        if self.transmission.port == self.receiver.port && self.transmission.bind == self.receiver.bind {
            return Err(Error::ConfigError("Camera and base cannot share one socket".to_string()));
        }

        if self.receiver.handshake_retry_ms == 0 {
            return Err(Error::ConfigError("Handshake retry must be greater than 0".to_string()));
        }

        if self.source.width == 0 || self.source.height == 0 {
            return Err(Error::ConfigError("Source dimensions must be greater than 0".to_string()));
        }
        if self.source.buffers == 0 {
            return Err(Error::ConfigError("Source needs at least one frame buffer".to_string()));
        }

        if self.detection.stride == 0 || self.detection.min_pixels == 0 {
            return Err(Error::ConfigError("Detector stride and min_pixels must be greater than 0".to_string()));
        }

        if self.display.panel_width == 0 || self.display.panel_height == 0 {
            return Err(Error::ConfigError("Panel dimensions must be greater than 0".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Tracking Head Configuration

# Stage wiring
pipeline:
  frame_capacity: 2
  command_capacity: 2
  annotate: true
  initial_mode: stopped
  analysis_interval_ms: 10

# Control laws (rates in deg/s, proportions of the frame)
control:
  horizontal:
    exclusion: 0.3
    min_rate: 1.0
    max_rate: 30.0
  vertical:
    exclusion: 0.2
    min_rate: 1.0
    max_rate: 30.0
  approach:
    target_area: 0.15
    tolerance: 0.05
    min_rate: 0.5
    max_rate: 20.0

# Camera side of the link
transmission:
  bind: 0.0.0.0
  port: 47800
  broadcast: 255.255.255.255
  min_delay_ms: 100
  precision: 2
  wire_fields: all

# Base side of the link
receiver:
  bind: 0.0.0.0
  port: 47801
  connection_timeout_ms: 120000
  handshake_retry_ms: 1000
  silence_timeout_ms: 1000

# Synthetic frame source
source:
  width: 320
  height: 240
  format: rgb565
  buffers: 4
  fps: 15

# Bright-region detector
detection:
  threshold: 200
  min_pixels: 4
  stride: 2

# Panel geometry
display:
  panel_width: 240
  panel_height: 240
"#;
