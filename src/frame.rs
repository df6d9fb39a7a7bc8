//! Frame buffers and their release obligation.
//!
//! A [`Frame`] is handed out by a [`FramePool`] and must travel back to that
//! pool exactly once. Returning happens either through [`Frame::release`] or
//! implicitly when the frame is dropped, so a frame that falls off the end of
//! the pipeline cannot leak and cannot be returned twice.

use crate::{detection::BoundingBox, Error, Result};
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 16-bit little-endian 5-6-5 RGB, as produced by the camera sensor
    Rgb565,
    /// 24-bit packed RGB
    Rgb888,
    /// 8-bit luminance
    Gray8,
}

impl PixelFormat {
    /// Bytes occupied by one pixel
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb565 => 2,
            Self::Rgb888 => 3,
            Self::Gray8 => 1,
        }
    }
}

/// Number of bytes a buffer of the given geometry must hold
///
/// # Errors
///
/// Returns an error if the size overflows `usize`
pub fn buffer_len(width: u32, height: u32, format: PixelFormat) -> Result<usize> {
    usize::try_from(width)
        .ok()
        .zip(usize::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h))
        .and_then(|px| px.checked_mul(format.bytes_per_pixel()))
        .ok_or_else(|| Error::InvalidInput(format!("Frame {width}x{height} is too large")))
}

/// RGB color used for annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const GREEN: Self = Self(0, 255, 0);

    fn to_rgb565(self) -> u16 {
        (u16::from(self.0 >> 3) << 11) | (u16::from(self.1 >> 2) << 5) | u16::from(self.2 >> 3)
    }

    fn luma(self) -> u8 {
        let y = (u32::from(self.0) * 77 + u32::from(self.1) * 150 + u32::from(self.2) * 29) >> 8;
        u8::try_from(y).unwrap_or(u8::MAX)
    }
}

/// An image buffer owned by exactly one pipeline stage at a time
#[derive(Debug)]
pub struct Frame {
    sequence: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    origin: Option<Arc<PoolShared>>,
}

impl Frame {
    /// Wrap a buffer that has no pool behind it
    ///
    /// The declared geometry is not checked here; see [`Frame::validate`].
    #[must_use]
    pub fn from_parts(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            sequence: 0,
            width,
            height,
            format,
            data,
            origin: None,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Position of this frame in its pool's output order
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Check that the buffer holds exactly `width * height` pixels
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] when the declared and actual sizes differ
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::MalformedFrame(format!(
                "frame {} has empty geometry {}x{}",
                self.sequence, self.width, self.height
            )));
        }
        let expected = buffer_len(self.width, self.height, self.format)?;
        if self.data.len() != expected {
            return Err(Error::MalformedFrame(format!(
                "frame {} declares {}x{} {:?} ({} bytes) but holds {} bytes",
                self.sequence,
                self.width,
                self.height,
                self.format,
                expected,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Luminance of one pixel, `None` outside the frame or the buffer
    #[must_use]
    pub fn luma(&self, x: u32, y: u32) -> Option<u8> {
        let offset = self.offset(x, y)?;
        match self.format {
            PixelFormat::Gray8 => self.data.get(offset).copied(),
            PixelFormat::Rgb888 => {
                let px = self.data.get(offset..offset + 3)?;
                Some(Rgb(px[0], px[1], px[2]).luma())
            }
            PixelFormat::Rgb565 => {
                let px = self.data.get(offset..offset + 2)?;
                let value = u16::from_le_bytes([px[0], px[1]]);
                let r = ((value >> 11) & 0x1F) as u8;
                let g = ((value >> 5) & 0x3F) as u8;
                let b = (value & 0x1F) as u8;
                Some(Rgb(r << 3, g << 2, b << 3).luma())
            }
        }
    }

    /// Paint a single pixel, ignoring coordinates outside the frame
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgb) {
        let Some(offset) = self.offset(x, y) else {
            return;
        };
        let (bytes, len) = match self.format {
            PixelFormat::Gray8 => ([color.luma(), 0, 0], 1),
            PixelFormat::Rgb888 => ([color.0, color.1, color.2], 3),
            PixelFormat::Rgb565 => {
                let [lo, hi] = color.to_rgb565().to_le_bytes();
                ([lo, hi, 0], 2)
            }
        };
        if let Some(dst) = self.data.get_mut(offset..offset + len) {
            dst.copy_from_slice(&bytes[..len]);
        }
    }

    /// Draw the outline of a bounding box, clipped to the frame
    pub fn outline(&mut self, bbox: &BoundingBox, color: Rgb) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let max_x = i64::from(self.width - 1);
        let max_y = i64::from(self.height - 1);
        let clip = |v: i32, max: i64| u32::try_from(i64::from(v).clamp(0, max)).unwrap_or(0);
        let (left, right) = (clip(bbox.left, max_x), clip(bbox.right, max_x));
        let (top, bottom) = (clip(bbox.top, max_y), clip(bbox.bottom, max_y));

        for x in left..=right {
            self.put_pixel(x, top, color);
            self.put_pixel(x, bottom, color);
        }
        for y in top..=bottom {
            self.put_pixel(left, y, color);
            self.put_pixel(right, y, color);
        }
    }

    /// Hand the buffer back to the pool it came from
    pub fn release(self) {
        trace!("Releasing frame {}", self.sequence);
        drop(self);
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = usize::try_from(y).ok()?.checked_mul(usize::try_from(self.width).ok()?)?;
        row.checked_add(usize::try_from(x).ok()?)?
            .checked_mul(self.format.bytes_per_pixel())
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(origin) = self.origin.take() {
            origin.give_back(std::mem::take(&mut self.data));
        }
    }
}

#[derive(Debug)]
struct PoolShared {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PoolShared {
    fn give_back(&self, buffer: Vec<u8>) {
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buffer);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.released.fetch_add(1, Ordering::AcqRel);
    }
}

/// Origin of frames: a fixed set of reusable buffers
///
/// The pool never allocates beyond `capacity` buffers; a source asking for
/// more while all of them are in flight gets [`Error::ResourceExhausted`].
#[derive(Debug, Clone)]
pub struct FramePool {
    width: u32,
    height: u32,
    format: PixelFormat,
    capacity: usize,
    shared: Arc<PoolShared>,
}

impl FramePool {
    /// Create a pool of `capacity` buffers of the given geometry
    ///
    /// # Errors
    ///
    /// Returns an error for a zero capacity or an oversized geometry
    pub fn new(width: u32, height: u32, format: PixelFormat, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidInput("Frame pool capacity must be greater than 0".to_string()));
        }
        let len = buffer_len(width, height, format)?;
        let free = (0..capacity).map(|_| vec![0u8; len]).collect();
        debug!("Frame pool ready: {capacity} buffers of {width}x{height} {format:?}");

        Ok(Self {
            width,
            height,
            format,
            capacity,
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
                outstanding: AtomicUsize::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        })
    }

    /// Take a free buffer out of the pool
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when every buffer is in flight
    pub fn acquire(&self) -> Result<Frame> {
        let buffer = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| {
                Error::ResourceExhausted(format!("all {} frame buffers are in flight", self.capacity))
            })?;
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        let sequence = self.shared.acquired.fetch_add(1, Ordering::AcqRel);

        Ok(Frame {
            sequence,
            width: self.width,
            height: self.height,
            format: self.format,
            data: buffer,
            origin: Some(Arc::clone(&self.shared)),
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently owned by some stage
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Total frames handed out so far
    #[must_use]
    pub fn acquired(&self) -> u64 {
        self.shared.acquired.load(Ordering::Acquire)
    }

    /// Total frames returned so far
    #[must_use]
    pub fn released(&self) -> u64 {
        self.shared.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_detects_size_mismatch() {
        let frame = Frame::from_parts(4, 4, PixelFormat::Rgb565, vec![0; 31]);
        assert!(matches!(frame.validate(), Err(Error::MalformedFrame(_))));

        let frame = Frame::from_parts(4, 4, PixelFormat::Rgb565, vec![0; 32]);
        assert!(frame.validate().is_ok());

        let frame = Frame::from_parts(0, 4, PixelFormat::Gray8, Vec::new());
        assert!(frame.validate().is_err());
    }

    #[test]
    fn test_pool_release_exactly_once() {
        let pool = FramePool::new(8, 8, PixelFormat::Gray8, 2).unwrap();

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(Error::ResourceExhausted(_))));
        assert_eq!(pool.outstanding(), 2);

        a.release();
        drop(b);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.released(), 2);

        // Buffers are reused
        let c = pool.acquire().unwrap();
        assert_eq!(c.sequence(), 2);
        assert_eq!(c.data().len(), 64);
    }

    #[test]
    fn test_rgb565_luma_round_trip() {
        let mut frame = Frame::from_parts(2, 1, PixelFormat::Rgb565, vec![0; 4]);
        frame.put_pixel(1, 0, Rgb(255, 255, 255));
        assert_eq!(frame.luma(0, 0), Some(0));
        assert!(frame.luma(1, 0).unwrap() > 240);
        assert_eq!(frame.luma(2, 0), None);
    }

    #[test]
    fn test_outline_clips_to_frame() {
        let mut frame = Frame::from_parts(10, 10, PixelFormat::Gray8, vec![0; 100]);
        let bbox = BoundingBox::new(-5, 2, 4, 40);
        frame.outline(&bbox, Rgb(255, 255, 255));

        assert_eq!(frame.luma(0, 5), Some(255));
        assert_eq!(frame.luma(4, 9), Some(255));
        assert_eq!(frame.luma(2, 5), Some(0));
    }
}
