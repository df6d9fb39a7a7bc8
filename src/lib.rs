//! Face-following camera head.
//!
//! This library turns a stream of camera frames into motion commands for a
//! mobile base:
//! - a bounded, blocking stage pipeline that owns every frame buffer exactly
//!   once and returns it to its pool when done
//! - dead-zone proportional control laws for pan, tilt and approach
//! - a mode controller fanning out Stopped / DisplayOnly / TrackingActive to
//!   the stages that care
//! - a best-effort command link that discovers its peer from a fixed token
//!   and paces transmissions to a minimum interval
//!
//! The pipeline consists of:
//! 1. A frame source filling pooled buffers
//! 2. The tracking stage running detection and the control laws
//! 3. The display stage drawing frames on a panel
//! 4. The transmission stage sending commands to the base
//! 5. An analysis worker reading the latest detection set
//!
//! # Examples
//!
//! ## Control law
//!
//! ```
//! use tracking_head::control::ControlLaw;
//! use tracking_head::detection::{BoundingBox, Detection};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let law = ControlLaw::default();
//! // A face hugging the left border of a 100x100 frame
//! let faces = [Detection::new(BoundingBox::new(0, 40, 20, 60), 0.9)];
//!
//! let command = law.command_for(&faces, 100, 100)?.ok_or("no face")?;
//! assert!(command.horizontal_rotation < 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a head in one process
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracking_head::{
//!     config::Config, detection::BrightRegionDetector, display::LogDisplay, frame::PixelFormat,
//!     mode::OperatingMode, pipeline::Pipeline, source::SyntheticSource,
//!     transmission::{MacAddress, MemoryMedium},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let medium = MemoryMedium::new();
//! let link = Arc::new(medium.join(MacAddress([2, 0, 0, 0, 0, 1]))?);
//! let source = SyntheticSource::new(320, 240, PixelFormat::Rgb565, 4)?;
//!
//! let head = Pipeline::launch(&Config::default(), source, BrightRegionDetector::default(), LogDisplay::default(), link)?;
//! head.set_mode(OperatingMode::TrackingActive);
//! let stats = head.shutdown()?;
//! println!("{} frames tracked", stats.tracking.frames);
//! # Ok(())
//! # }
//! ```

/// Bounded channels between stages and the shutdown signal
pub mod channel;

/// Pooled frame buffers and pixel access
pub mod frame;

/// Face detections, the detector capability and the aggregate region
pub mod detection;

/// Dead-zone control laws turning a region into a motion command
pub mod control;

/// Operating mode and its observers
pub mod mode;

/// Single-slot buffer between tracking and analysis
pub mod mailbox;

/// Detection and command generation stage
pub mod tracking;

/// Low-priority consumer of detection results
pub mod analysis;

/// Panel output stage
pub mod display;

/// Frame producers
pub mod source;

/// Discovery tokens and the motion command wire format
pub mod protocol;

/// Command link to the mobile base
pub mod transmission;

/// Mobile-base side of the command link
pub mod receiver;

/// Stage wiring and lifecycle
pub mod pipeline;

/// Error types and result handling
pub mod error;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
