//! Proportional motion control derived from detection geometry.
//!
//! The tracked region is reduced to proportions of the frame, so the laws
//! below are independent of the camera resolution. Each axis has a dead zone
//! around its setpoint; inside it the axis outputs exactly zero, which keeps
//! the base still while the face is centered and at the right distance.

use crate::{
    constants::{
        MAX_FORWARD_DISPLACEMENT, MAX_HORIZONTAL_ROTATION, MAX_VERTICAL_ROTATION, MIN_FORWARD_DISPLACEMENT,
        MIN_HORIZONTAL_ROTATION, MIN_VERTICAL_ROTATION, TARGET_AREA_PROPORTION, TARGET_AREA_PROPORTION_TOLERANCE,
        TARGET_HORIZONTAL_EXCLUSION_PROPORTION, TARGET_VERTICAL_EXCLUSION_PROPORTION,
    },
    detection::{aggregate_region, BoundingBox, Detection},
    Error, Result,
};
use serde::{Deserialize, Serialize};

/// Linear remap of `value` from `[in_lo, in_hi]` onto `[out_lo, out_hi]`
///
/// Not clamped: values outside the input range extrapolate.
#[must_use]
pub fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    (value - in_lo) * (out_hi - out_lo) / (in_hi - in_lo) + out_lo
}

/// Three-axis motion order sent to the mobile base
///
/// The default value is the "hold position" command.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionCommand {
    /// Rotation around the vertical axis in deg/s, positive turns right
    pub horizontal_rotation: f64,
    /// Tilt rate in deg/s, positive looks down
    pub vertical_rotation: f64,
    /// Approach speed, positive moves towards the target
    pub forward_displacement: f64,
}

impl MotionCommand {
    pub const HOLD: Self = Self {
        horizontal_rotation: 0.0,
        vertical_rotation: 0.0,
        forward_displacement: 0.0,
    };

    #[must_use]
    pub const fn new(horizontal_rotation: f64, vertical_rotation: f64, forward_displacement: f64) -> Self {
        Self {
            horizontal_rotation,
            vertical_rotation,
            forward_displacement,
        }
    }

    /// True when every axis is exactly zero
    #[must_use]
    pub fn is_hold(&self) -> bool {
        self.horizontal_rotation == 0.0 && self.vertical_rotation == 0.0 && self.forward_displacement == 0.0
    }
}

/// Edges and area of the tracked region relative to the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionProportions {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub area: f64,
}

impl RegionProportions {
    /// Express a region as proportions of a `width` x `height` frame
    ///
    /// # Errors
    ///
    /// Returns an error for a frame with zero width or height
    pub fn from_region(region: &BoundingBox, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!("Cannot take proportions of a {width}x{height} frame")));
        }
        let (w, h) = (f64::from(width), f64::from(height));

        Ok(Self {
            left: f64::from(region.left) / w,
            right: f64::from(region.right) / w,
            top: f64::from(region.top) / h,
            bottom: f64::from(region.bottom) / h,
            area: region.area() as f64 / (w * h),
        })
    }
}

/// Rotation law for one axis with a dead zone at each frame border
///
/// While the region stays more than `exclusion` away from both borders the
/// rate is zero. Crossing into the band at the low border ramps the rate from
/// `-min_rate` at the band edge to `-max_rate` at the border, and mirrored
/// for the high border.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeadZoneAxis {
    pub exclusion: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl DeadZoneAxis {
    /// Rate for a region spanning `[low_edge, high_edge]` in proportions
    #[must_use]
    pub fn rate(&self, low_edge: f64, high_edge: f64) -> f64 {
        if low_edge < self.exclusion {
            remap(low_edge, 0.0, self.exclusion, -self.max_rate, -self.min_rate)
        } else if high_edge > 1.0 - self.exclusion {
            remap(high_edge, 1.0 - self.exclusion, 1.0, self.min_rate, self.max_rate)
        } else {
            0.0
        }
    }

    /// Validate the axis parameters
    ///
    /// # Errors
    ///
    /// Returns an error for an exclusion band outside `(0, 0.5)` or inverted rates
    pub fn validate(&self, axis: &str) -> Result<()> {
        if !(self.exclusion > 0.0 && self.exclusion < 0.5) {
            return Err(Error::ConfigError(format!("{axis} exclusion must be in (0, 0.5)")));
        }
        if !(self.min_rate >= 0.0 && self.min_rate <= self.max_rate) {
            return Err(Error::ConfigError(format!("{axis} rates must satisfy 0 <= min <= max")));
        }
        Ok(())
    }
}

/// Approach law driven by the area the region covers
///
/// Inside `target_area ± tolerance` the base holds. A smaller region drives
/// forward from `max_rate` (area 0) down to `min_rate` at the band edge; a
/// larger one retreats from `-min_rate` at the band edge to `-max_rate` at
/// `2 * target_area + tolerance`, and keeps growing past that point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApproachAxis {
    pub target_area: f64,
    pub tolerance: f64,
    pub min_rate: f64,
    pub max_rate: f64,
}

impl ApproachAxis {
    #[must_use]
    pub fn rate(&self, area: f64) -> f64 {
        let near = self.target_area - self.tolerance;
        let far = self.target_area + self.tolerance;
        if area < near {
            remap(area, 0.0, near, self.max_rate, self.min_rate)
        } else if area > far {
            remap(area, far, 2.0 * self.target_area + self.tolerance, -self.min_rate, -self.max_rate)
        } else {
            0.0
        }
    }

    /// Validate the axis parameters
    ///
    /// # Errors
    ///
    /// Returns an error when the hold band does not fit inside `(0, 1)`
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0 && self.target_area - self.tolerance > 0.0 && self.target_area + self.tolerance < 1.0)
        {
            return Err(Error::ConfigError(
                "Approach target area and tolerance must leave a band inside (0, 1)".to_string(),
            ));
        }
        if !(self.min_rate >= 0.0 && self.min_rate <= self.max_rate) {
            return Err(Error::ConfigError("Approach rates must satisfy 0 <= min <= max".to_string()));
        }
        Ok(())
    }
}

/// The three independent control laws
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLaw {
    pub horizontal: DeadZoneAxis,
    pub vertical: DeadZoneAxis,
    pub approach: ApproachAxis,
}

impl Default for ControlLaw {
    fn default() -> Self {
        Self {
            horizontal: DeadZoneAxis {
                exclusion: TARGET_HORIZONTAL_EXCLUSION_PROPORTION,
                min_rate: MIN_HORIZONTAL_ROTATION,
                max_rate: MAX_HORIZONTAL_ROTATION,
            },
            vertical: DeadZoneAxis {
                exclusion: TARGET_VERTICAL_EXCLUSION_PROPORTION,
                min_rate: MIN_VERTICAL_ROTATION,
                max_rate: MAX_VERTICAL_ROTATION,
            },
            approach: ApproachAxis {
                target_area: TARGET_AREA_PROPORTION,
                tolerance: TARGET_AREA_PROPORTION_TOLERANCE,
                min_rate: MIN_FORWARD_DISPLACEMENT,
                max_rate: MAX_FORWARD_DISPLACEMENT,
            },
        }
    }
}

impl ControlLaw {
    /// Command for a region already reduced to proportions
    #[must_use]
    pub fn command(&self, p: &RegionProportions) -> MotionCommand {
        MotionCommand {
            horizontal_rotation: self.horizontal.rate(p.left, p.right),
            vertical_rotation: self.vertical.rate(p.top, p.bottom),
            forward_displacement: self.approach.rate(p.area),
        }
    }

    /// Command for the detections of one frame, `None` when nothing was found
    ///
    /// # Errors
    ///
    /// Returns an error for a frame with zero width or height
    pub fn command_for(&self, detections: &[Detection], width: u32, height: u32) -> Result<Option<MotionCommand>> {
        let Some(region) = aggregate_region(detections) else {
            return Ok(None);
        };
        let proportions = RegionProportions::from_region(&region, width, height)?;
        log::debug!(
            "Region {:?}: left {:.3} right {:.3} top {:.3} bottom {:.3} area {:.3}",
            region,
            proportions.left,
            proportions.right,
            proportions.top,
            proportions.bottom,
            proportions.area
        );
        Ok(Some(self.command(&proportions)))
    }

    /// Validate all three axes
    ///
    /// # Errors
    ///
    /// Returns the first axis error found
    pub fn validate(&self) -> Result<()> {
        self.horizontal.validate("Horizontal")?;
        self.vertical.validate("Vertical")?;
        self.approach.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_remap_endpoints() {
        assert!((remap(0.0, 0.0, 0.3, -30.0, -1.0) + 30.0).abs() < TOL);
        assert!((remap(0.3, 0.0, 0.3, -30.0, -1.0) + 1.0).abs() < TOL);
        assert!((remap(0.15, 0.0, 0.3, -30.0, -1.0) + 15.5).abs() < TOL);
    }

    #[test]
    fn test_default_command_is_hold() {
        assert!(MotionCommand::default().is_hold());
        assert_eq!(MotionCommand::default(), MotionCommand::HOLD);
        assert!(!MotionCommand::new(0.0, 0.0, 0.5).is_hold());
    }

    #[test]
    fn test_horizontal_law() {
        let law = ControlLaw::default();
        assert!((law.horizontal.rate(0.0, 0.5) + 30.0).abs() < TOL);
        assert!((law.horizontal.rate(0.3 - 1e-12, 0.5) + 1.0).abs() < 1e-6);
        assert_eq!(law.horizontal.rate(0.3, 0.7), 0.0);
        assert_eq!(law.horizontal.rate(0.45, 0.6), 0.0);
        assert!((law.horizontal.rate(0.5, 1.0) - 30.0).abs() < TOL);
    }

    #[test]
    fn test_vertical_law_uses_narrower_band() {
        let law = ControlLaw::default();
        assert_eq!(law.vertical.rate(0.25, 0.75), 0.0);
        assert!((law.vertical.rate(0.0, 0.5) + 30.0).abs() < TOL);
        assert!((law.vertical.rate(0.3, 1.0) - 30.0).abs() < TOL);
        assert!(law.vertical.rate(0.1, 0.5) < 0.0);
    }

    #[test]
    fn test_approach_law() {
        let law = ControlLaw::default();
        assert_eq!(law.approach.rate(0.15), 0.0);
        assert!((law.approach.rate(0.0) - 20.0).abs() < TOL);
        assert!((law.approach.rate(0.35) + 20.0).abs() < TOL);
        assert!(law.approach.rate(0.05) > 0.0);
        assert!(law.approach.rate(0.25) < 0.0);
    }

    #[test]
    fn test_retreat_extrapolates_past_far_point() {
        let law = ControlLaw::default();
        assert!((law.approach.rate(0.6) + 52.5).abs() < TOL);
        assert!((law.approach.rate(0.6) - remap(0.6, 0.2, 0.35, -0.5, -20.0)).abs() < TOL);
        assert!(law.approach.rate(1.0) < law.approach.rate(0.6));
    }

    #[test]
    fn test_centered_target_holds() {
        let law = ControlLaw::default();
        // 100x100 frame, centered box covering 16% of the frame
        let detections = vec![Detection::new(BoundingBox::new(30, 30, 70, 70), 0.9)];
        let command = law.command_for(&detections, 100, 100).unwrap().unwrap();
        assert!(command.is_hold(), "got {command:?}");
    }

    #[test]
    fn test_no_detections_gives_no_command() {
        let law = ControlLaw::default();
        assert!(law.command_for(&[], 100, 100).unwrap().is_none());
    }

    #[test]
    fn test_zero_sized_frame_rejected() {
        let law = ControlLaw::default();
        let detections = vec![Detection::new(BoundingBox::new(0, 0, 1, 1), 0.9)];
        assert!(law.command_for(&detections, 0, 100).is_err());
    }

    proptest! {
        #[test]
        fn prop_remap_hits_output_bounds(
            in_lo in -10.0f64..10.0,
            span in 0.01f64..10.0,
            out_lo in -100.0f64..100.0,
            out_hi in -100.0f64..100.0,
        ) {
            let in_hi = in_lo + span;
            prop_assert_eq!(remap(in_lo, in_lo, in_hi, out_lo, out_hi), out_lo);
            let scale = out_lo.abs().max(out_hi.abs()).max(1.0);
            prop_assert!((remap(in_hi, in_lo, in_hi, out_lo, out_hi) - out_hi).abs() <= 1e-9 * scale);
        }

        #[test]
        fn prop_dead_zone_holds_inside_band(low in 0.3f64..0.5, high in 0.5f64..0.7) {
            prop_assert_eq!(ControlLaw::default().horizontal.rate(low, high), 0.0);
        }
    }
}
