//! Display stage feeding the panel collaborator.

use crate::{
    channel::{hand_off, Handoff, StageIo},
    frame::Frame,
    mode::ModeSwitch,
    Error, Result,
};
use log::{debug, info, trace, warn};
use std::thread::{self, JoinHandle};

/// Size a frame is drawn at on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fit {
    pub width: u32,
    pub height: u32,
}

/// Largest size with the frame's aspect ratio that fits the panel
#[must_use]
pub fn letterbox(frame_width: u32, frame_height: u32, panel_width: u32, panel_height: u32) -> Fit {
    if frame_width == 0 || frame_height == 0 {
        return Fit {
            width: 0,
            height: 0,
        };
    }
    if frame_width == panel_width && frame_height == panel_height {
        return Fit {
            width: panel_width,
            height: panel_height,
        };
    }
    let scale = (f64::from(panel_width) / f64::from(frame_width)).min(f64::from(panel_height) / f64::from(frame_height));
    let to_px = |v: u32, max: u32| ((f64::from(v) * scale).floor() as u32).clamp(1, max.max(1));

    Fit {
        width: to_px(frame_width, panel_width),
        height: to_px(frame_height, panel_height),
    }
}

/// Panel the display stage draws on
pub trait Display: Send {
    /// Draw one frame scaled to `fit`
    ///
    /// # Errors
    ///
    /// Returns an error if the panel rejects the frame
    fn show(&mut self, frame: &Frame, fit: Fit) -> Result<()>;

    /// Blank the panel before live frames start
    ///
    /// # Errors
    ///
    /// Returns an error if the panel cannot be drawn
    fn clear(&mut self) -> Result<()>;

    /// Draw the idle screen shown while stopped
    ///
    /// # Errors
    ///
    /// Returns an error if the panel cannot be drawn
    fn idle(&mut self) -> Result<()>;

    /// Get display name
    fn name(&self) -> &str;
}

/// Headless display that only logs what it would draw
#[derive(Debug, Default)]
pub struct LogDisplay {
    shown: u64,
}

impl LogDisplay {
    #[must_use]
    pub const fn shown(&self) -> u64 {
        self.shown
    }
}

impl Display for LogDisplay {
    fn show(&mut self, frame: &Frame, fit: Fit) -> Result<()> {
        self.shown += 1;
        trace!(
            "display: frame {} {}x{} drawn at {}x{}",
            frame.sequence(),
            frame.width(),
            frame.height(),
            fit.width,
            fit.height
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        debug!("display: clear");
        Ok(())
    }

    fn idle(&mut self) -> Result<()> {
        debug!("display: idle screen");
        Ok(())
    }

    fn name(&self) -> &str {
        "LogDisplay"
    }
}

/// Counters kept by the display stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayStats {
    pub frames: u64,
    pub shown: u64,
    pub errors: u64,
    pub forwarded: u64,
    pub released: u64,
}

/// The display worker
pub struct DisplayStage<P: Display> {
    io: StageIo<Frame>,
    panel: P,
    switch: ModeSwitch,
    panel_width: u32,
    panel_height: u32,
    cleared: bool,
    idle_drawn: bool,
    stats: DisplayStats,
}

impl<P: Display> DisplayStage<P> {
    pub fn new(io: StageIo<Frame>, panel: P, switch: ModeSwitch, panel_width: u32, panel_height: u32) -> Self {
        Self {
            io,
            panel,
            switch,
            panel_width,
            panel_height,
            cleared: false,
            idle_drawn: false,
            stats: DisplayStats::default(),
        }
    }

    #[must_use]
    pub const fn stats(&self) -> DisplayStats {
        self.stats
    }

    #[must_use]
    pub const fn panel(&self) -> &P {
        &self.panel
    }

    /// Draw (or not) one frame, then pass it on
    pub fn process(&mut self, frame: Frame) -> Handoff {
        self.stats.frames += 1;

        if let Err(e) = self.draw(&frame) {
            self.stats.errors += 1;
            warn!("display: frame {} not drawn: {}", frame.sequence(), e);
        }

        let handoff = hand_off(self.io.output.as_ref(), frame, "display");
        match handoff {
            Handoff::Forwarded => self.stats.forwarded += 1,
            Handoff::Released => self.stats.released += 1,
        }
        handoff
    }

    fn draw(&mut self, frame: &Frame) -> Result<()> {
        if !self.switch.is_on() {
            self.cleared = false;
            if !self.idle_drawn {
                self.idle_drawn = true;
                self.panel.idle()?;
            }
            return Ok(());
        }

        self.idle_drawn = false;
        if !self.cleared {
            self.cleared = true;
            self.panel.clear()?;
        }
        frame.validate().map_err(|e| Error::Display(e.to_string()))?;
        let fit = letterbox(frame.width(), frame.height(), self.panel_width, self.panel_height);
        self.panel.show(frame, fit)?;
        self.stats.shown += 1;
        Ok(())
    }

    /// Run until the input channel closes
    pub fn run(mut self) -> DisplayStats {
        info!("display: start ({}, {}x{})", self.panel.name(), self.panel_width, self.panel_height);
        while let Some(frame) = self.io.receive() {
            self.process(frame);
        }
        if let Err(e) = self.panel.idle() {
            warn!("display: idle screen failed: {e}");
        }
        info!("display: stop, {:?}", self.stats);
        self.stats
    }
}

impl<P: Display + 'static> DisplayStage<P> {
    /// Run the stage on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(self) -> Result<JoinHandle<DisplayStats>> {
        thread::Builder::new()
            .name("display".to_string())
            .spawn(move || self.run())
            .map_err(Error::Io)
    }
}
