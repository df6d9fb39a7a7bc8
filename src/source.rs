//! Frame source stage.
//!
//! Sensor capture is outside this crate: anything that yields pool-backed
//! [`Frame`]s implements [`FrameSource`]. The stage pushes frames into the
//! first bounded channel until the source ends, the frame limit is reached,
//! or shutdown is requested. Dropping its sender then closes the pipeline
//! stage by stage.

use crate::{
    channel::{Sender, ShutdownListener},
    frame::{Frame, FramePool, PixelFormat, Rgb},
    Error, Result,
};
use log::{info, warn};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Producer of camera frames
pub trait FrameSource: Send {
    /// Next frame, `None` once the source is exhausted
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] when no buffer is free, other
    /// errors when capture fails
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Get source name
    fn name(&self) -> &str;
}

/// Moving bright square on a dark background
///
/// The square sweeps a Lissajous path, grows and shrinks, and disappears
/// for part of every cycle, so every control axis and the "no target" case
/// are exercised.
pub struct SyntheticSource {
    pool: FramePool,
    tick: u64,
    cycle: u64,
}

impl SyntheticSource {
    /// Create a source drawing into `buffers` pooled frames
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid pool geometry
    pub fn new(width: u32, height: u32, format: PixelFormat, buffers: usize) -> Result<Self> {
        Ok(Self {
            pool: FramePool::new(width, height, format, buffers)?,
            tick: 0,
            cycle: 240,
        })
    }

    /// Pool backing this source, for accounting
    #[must_use]
    pub const fn pool(&self) -> &FramePool {
        &self.pool
    }

    fn paint(&self, frame: &mut Frame) {
        frame.data_mut().fill(0);

        let phase = (self.tick % self.cycle) as f64 / self.cycle as f64;
        // Target absent for the last sixth of each cycle
        if phase > 5.0 / 6.0 {
            return;
        }
        let angle = phase * std::f64::consts::TAU;
        let (w, h) = (f64::from(frame.width()), f64::from(frame.height()));
        let side = (w.min(h) * (0.25 + 0.2 * (2.0 * angle).sin())).max(2.0);
        let cx = w / 2.0 + (w / 2.0 - side / 2.0) * angle.sin();
        let cy = h / 2.0 + (h / 2.0 - side / 2.0) * (1.5 * angle).cos();

        let x0 = (cx - side / 2.0).max(0.0) as u32;
        let y0 = (cy - side / 2.0).max(0.0) as u32;
        let x1 = ((cx + side / 2.0) as u32).min(frame.width());
        let y1 = ((cy + side / 2.0) as u32).min(frame.height());
        for y in y0..y1 {
            for x in x0..x1 {
                frame.put_pixel(x, y, Rgb(255, 255, 255));
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut frame = self.pool.acquire()?;
        self.paint(&mut frame);
        self.tick += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        "SyntheticSource"
    }
}

/// Counters kept by the source stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub produced: u64,
    pub starved: u64,
    pub errors: u64,
}

/// The frame source worker
pub struct SourceStage<S: FrameSource> {
    source: S,
    output: Option<Sender<Frame>>,
    frame_interval: Duration,
    max_frames: Option<u64>,
    shutdown: ShutdownListener,
    stats: SourceStats,
}

impl<S: FrameSource> SourceStage<S> {
    pub fn new(source: S, output: Option<Sender<Frame>>, shutdown: ShutdownListener) -> Self {
        Self {
            source,
            output,
            frame_interval: Duration::ZERO,
            max_frames: None,
            shutdown,
            stats: SourceStats::default(),
        }
    }

    /// Pace output to one frame per `interval`
    #[must_use]
    pub const fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Stop after `limit` frames
    #[must_use]
    pub const fn with_max_frames(mut self, limit: Option<u64>) -> Self {
        self.max_frames = limit;
        self
    }

    /// Produce until exhausted, limited, or shut down
    pub fn run(mut self) -> SourceStats {
        info!("source: start ({})", self.source.name());
        let Some(output) = self.output.take() else {
            info!("source: no output configured");
            return self.stats;
        };

        loop {
            if self.shutdown.is_triggered() || self.max_frames.is_some_and(|limit| self.stats.produced >= limit) {
                break;
            }

            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    if output.send(frame).is_err() {
                        warn!("source: pipeline closed");
                        break;
                    }
                    self.stats.produced += 1;
                }
                Ok(None) => {
                    info!("source: exhausted");
                    break;
                }
                Err(Error::ResourceExhausted(msg)) => {
                    self.stats.starved += 1;
                    warn!("source: {msg}, skipping this cycle");
                    if self.shutdown.wait(self.frame_interval.max(Duration::from_millis(1))) {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    self.stats.errors += 1;
                    warn!("source: capture failed: {e}");
                }
            }

            if !self.frame_interval.is_zero() && self.shutdown.wait(self.frame_interval) {
                break;
            }
        }

        info!("source: stop, {:?}", self.stats);
        self.stats
    }
}

impl<S: FrameSource + 'static> SourceStage<S> {
    /// Run the stage on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(self) -> Result<JoinHandle<SourceStats>> {
        thread::Builder::new()
            .name("source".to_string())
            .spawn(move || self.run())
            .map_err(Error::Io)
    }
}
