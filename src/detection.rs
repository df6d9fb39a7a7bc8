//! Detection results and the detection capability seam.
//!
//! The face detection model itself lives outside this crate; anything that
//! can turn a [`Frame`] into a list of boxes implements [`Detector`].

use crate::{frame::Frame, Error, Result};
use log::trace;

/// Axis-aligned box in pixel coordinates, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    #[must_use]
    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    /// Area of the box; zero for inverted boxes
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::try_from(self.width().max(0) * self.height().max(0)).unwrap_or(0)
    }

    /// Smallest box covering both `self` and `other`
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// One detected face
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bounding box of the detected face
    pub bbox: BoundingBox,
    /// Confidence score of the detection
    pub score: f32,
}

impl Detection {
    #[must_use]
    pub const fn new(bbox: BoundingBox, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// Smallest box covering every detection of one frame
///
/// Returns `None` for an empty set. Each input box is normalised first so the
/// result always satisfies `left <= right` and `top <= bottom`.
#[must_use]
pub fn aggregate_region(detections: &[Detection]) -> Option<BoundingBox> {
    detections
        .iter()
        .map(|d| {
            let b = d.bbox;
            BoundingBox::new(b.left.min(b.right), b.top.min(b.bottom), b.left.max(b.right), b.top.max(b.bottom))
        })
        .reduce(|acc, b| acc.union(&b))
}

/// Capability that finds faces in a frame
///
/// Implementations block for the whole inference.
pub trait Detector: Send {
    /// Run detection on one frame
    ///
    /// # Errors
    ///
    /// Returns an error when inference fails for this frame
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Get detector name
    fn name(&self) -> &str;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Stand-in detector reporting the box around all bright pixels
///
/// Useful with the synthetic source and on bench setups with a lamp as the
/// target; it scans every `stride`-th pixel.
pub struct BrightRegionDetector {
    threshold: u8,
    min_pixels: usize,
    stride: u32,
}

impl BrightRegionDetector {
    /// Create a detector
    ///
    /// # Errors
    ///
    /// Returns an error for a zero stride
    pub fn new(threshold: u8, min_pixels: usize, stride: u32) -> Result<Self> {
        if stride == 0 {
            return Err(Error::InvalidInput("Detector stride must be greater than 0".to_string()));
        }
        Ok(Self {
            threshold,
            min_pixels,
            stride,
        })
    }
}

impl Default for BrightRegionDetector {
    fn default() -> Self {
        Self {
            threshold: 200,
            min_pixels: 4,
            stride: 2,
        }
    }
}

impl Detector for BrightRegionDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        frame.validate().map_err(|e| Error::Detection(e.to_string()))?;

        let mut region: Option<BoundingBox> = None;
        let mut hits = 0usize;
        let step = usize::try_from(self.stride).unwrap_or(1);

        for y in (0..frame.height()).step_by(step) {
            for x in (0..frame.width()).step_by(step) {
                if frame.luma(x, y).is_some_and(|l| l >= self.threshold) {
                    hits += 1;
                    let (xi, yi) = (i32::try_from(x).unwrap_or(i32::MAX), i32::try_from(y).unwrap_or(i32::MAX));
                    let point = BoundingBox::new(xi, yi, xi, yi);
                    region = Some(region.map_or(point, |r| r.union(&point)));
                }
            }
        }

        match region {
            Some(bbox) if hits >= self.min_pixels => {
                let sampled = (bbox.area().max(1) / u64::from(self.stride * self.stride)).max(1);
                let score = (hits as f64 / sampled as f64).min(1.0) as f32;
                trace!("Bright region {:?}, {} hits", bbox, hits);
                Ok(vec![Detection::new(bbox, score)])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &str {
        "BrightRegionDetector"
    }
}
