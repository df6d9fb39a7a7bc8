//! Tracking stage: detection, control law and frame forwarding.
//!
//! For every frame the stage checks its mode switch. With tracking off the
//! frame goes straight downstream. With tracking on, the detector runs on
//! the frame, the resulting set is posted to the mailbox, a motion command is
//! queued when at least one face was found, and the frame (outlined if
//! configured) continues downstream. Failures only cost the current
//! iteration: the frame is still forwarded or released.

use crate::{
    channel::{hand_off, Handoff, Sender, StageIo},
    control::{ControlLaw, MotionCommand},
    detection::Detector,
    frame::{Frame, Rgb},
    mailbox::DetectionMailbox,
    mode::ModeSwitch,
    Error, Result,
};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Counters kept by the tracking stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingStats {
    /// Frames received
    pub frames: u64,
    /// Detector invocations that returned a result
    pub inferences: u64,
    /// Inferences that found no face
    pub empty_results: u64,
    /// Iterations whose tracking part failed
    pub failures: u64,
    /// Motion commands queued for transmission
    pub commands_sent: u64,
    /// Frames sent to the next stage
    pub forwarded: u64,
    /// Frames returned to their origin
    pub released: u64,
}

/// Result of one iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iteration {
    /// Command computed this cycle, if any face was found
    pub command: Option<MotionCommand>,
    /// What happened to the frame
    pub handoff: Handoff,
}

/// The tracking worker
pub struct TrackingStage<D: Detector> {
    io: StageIo<Frame>,
    commands: Option<Sender<MotionCommand>>,
    detector: D,
    switch: ModeSwitch,
    law: ControlLaw,
    mailbox: Option<Arc<DetectionMailbox>>,
    annotate: bool,
    stats: TrackingStats,
}

impl<D: Detector> TrackingStage<D> {
    /// Create a tracking stage
    pub fn new(io: StageIo<Frame>, detector: D, switch: ModeSwitch, law: ControlLaw) -> Self {
        Self {
            io,
            commands: None,
            detector,
            switch,
            law,
            mailbox: None,
            annotate: false,
            stats: TrackingStats::default(),
        }
    }

    /// Queue motion commands on `commands`
    #[must_use]
    pub fn with_commands(mut self, commands: Sender<MotionCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Post every detection set to `mailbox`
    #[must_use]
    pub fn with_mailbox(mut self, mailbox: Arc<DetectionMailbox>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// Outline detected faces on forwarded frames
    #[must_use]
    pub const fn with_annotation(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    #[must_use]
    pub const fn stats(&self) -> TrackingStats {
        self.stats
    }

    /// Process one frame
    pub fn process(&mut self, mut frame: Frame) -> Iteration {
        self.stats.frames += 1;

        let command = if self.switch.is_on() {
            match self.track(&mut frame) {
                Ok(command) => command,
                Err(e) => {
                    self.stats.failures += 1;
                    warn!("tracking: frame {} skipped: {}", frame.sequence(), e);
                    None
                }
            }
        } else {
            None
        };

        let handoff = hand_off(self.io.output.as_ref(), frame, "tracking");
        match handoff {
            Handoff::Forwarded => self.stats.forwarded += 1,
            Handoff::Released => self.stats.released += 1,
        }

        Iteration { command, handoff }
    }

    fn track(&mut self, frame: &mut Frame) -> Result<Option<MotionCommand>> {
        frame.validate()?;

        let detections = self.detector.detect(frame)?;
        self.stats.inferences += 1;
        if detections.is_empty() {
            self.stats.empty_results += 1;
        }

        let command = self.law.command_for(&detections, frame.width(), frame.height())?;

        if self.annotate {
            for detection in &detections {
                frame.outline(&detection.bbox, Rgb::GREEN);
            }
        }

        if let Some(mailbox) = &self.mailbox {
            mailbox.post(detections);
        }

        if let Some(command) = command {
            debug!(
                "tracking: h {:.2} v {:.2} f {:.2}",
                command.horizontal_rotation, command.vertical_rotation, command.forward_displacement
            );
            self.queue(command);
        }

        Ok(command)
    }

    fn queue(&mut self, command: MotionCommand) {
        let Some(tx) = &self.commands else {
            return;
        };
        if tx.send(command).is_ok() {
            self.stats.commands_sent += 1;
        } else {
            warn!("tracking: transmission stage is gone, no more commands will be queued");
            self.commands = None;
        }
    }

    /// Run until the input channel closes
    pub fn run(mut self) -> TrackingStats {
        info!("tracking: start ({})", self.detector.name());
        while let Some(frame) = self.io.receive() {
            self.process(frame);
        }
        info!("tracking: stop, {:?}", self.stats);
        self.stats
    }
}

impl<D: Detector + 'static> TrackingStage<D> {
    /// Run the stage on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(self) -> Result<JoinHandle<TrackingStats>> {
        thread::Builder::new()
            .name("tracking".to_string())
            .spawn(move || self.run())
            .map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::bounded;
    use crate::detection::{BoundingBox, Detection};
    use crate::frame::{FramePool, PixelFormat};

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "FixedDetector"
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(Error::Detection("inference failed".to_string()))
        }

        fn name(&self) -> &str {
            "FailingDetector"
        }
    }

    fn pool() -> FramePool {
        FramePool::new(100, 100, PixelFormat::Gray8, 4).unwrap()
    }

    #[test]
    fn test_tracking_off_forwards_untouched() {
        let pool = pool();
        let (tx, rx) = bounded(2).unwrap();
        let (cmd_tx, cmd_rx) = bounded(2).unwrap();
        let detector = FixedDetector(vec![Detection::new(BoundingBox::new(0, 0, 10, 10), 0.9)]);
        let mut stage = TrackingStage::new(StageIo::new(None, Some(tx)), detector, ModeSwitch::fixed(false), ControlLaw::default())
            .with_commands(cmd_tx);

        let iteration = stage.process(pool.acquire().unwrap());
        assert_eq!(iteration.handoff, Handoff::Forwarded);
        assert!(iteration.command.is_none());
        assert!(cmd_rx.try_recv().is_err());
        assert_eq!(stage.stats().inferences, 0);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_left_target_turns_left() {
        let pool = pool();
        let (cmd_tx, cmd_rx) = bounded(2).unwrap();
        let detector = FixedDetector(vec![Detection::new(BoundingBox::new(0, 40, 20, 60), 0.9)]);
        let mut stage =
            TrackingStage::new(StageIo::new(None, None), detector, ModeSwitch::fixed(true), ControlLaw::default())
                .with_commands(cmd_tx);

        let iteration = stage.process(pool.acquire().unwrap());
        assert_eq!(iteration.handoff, Handoff::Released);
        let command = cmd_rx.try_recv().unwrap();
        assert!((command.horizontal_rotation + 30.0).abs() < 1e-9);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_empty_result_sends_nothing() {
        let pool = pool();
        let (cmd_tx, cmd_rx) = bounded(2).unwrap();
        let mailbox = Arc::new(DetectionMailbox::new());
        let mut stage = TrackingStage::new(
            StageIo::new(None, None),
            FixedDetector(Vec::new()),
            ModeSwitch::fixed(true),
            ControlLaw::default(),
        )
        .with_commands(cmd_tx)
        .with_mailbox(Arc::clone(&mailbox));

        for _ in 0..3 {
            stage.process(pool.acquire().unwrap());
        }
        assert!(cmd_rx.try_recv().is_err());
        assert_eq!(stage.stats().empty_results, 3);
        assert_eq!(mailbox.take(), Some(Vec::new()));
    }

    #[test]
    fn test_malformed_frame_still_released() {
        let (cmd_tx, cmd_rx) = bounded(2).unwrap();
        let detector = FixedDetector(vec![Detection::new(BoundingBox::new(0, 0, 10, 10), 0.9)]);
        let mut stage =
            TrackingStage::new(StageIo::new(None, None), detector, ModeSwitch::fixed(true), ControlLaw::default())
                .with_commands(cmd_tx);

        let frame = Frame::from_parts(100, 100, PixelFormat::Gray8, vec![0; 10]);
        let iteration = stage.process(frame);
        assert_eq!(iteration.handoff, Handoff::Released);
        assert_eq!(stage.stats().failures, 1);
        assert!(cmd_rx.try_recv().is_err());
    }

    #[test]
    fn test_detector_failure_costs_one_iteration() {
        let pool = pool();
        let (tx, rx) = bounded(2).unwrap();
        let (cmd_tx, cmd_rx) = bounded(2).unwrap();
        let mailbox = Arc::new(DetectionMailbox::new());
        let mut stage = TrackingStage::new(
            StageIo::new(None, Some(tx)),
            FailingDetector,
            ModeSwitch::fixed(true),
            ControlLaw::default(),
        )
        .with_commands(cmd_tx)
        .with_mailbox(Arc::clone(&mailbox));

        let iteration = stage.process(pool.acquire().unwrap());
        assert_eq!(iteration.handoff, Handoff::Forwarded);
        assert!(iteration.command.is_none());
        assert_eq!(stage.stats().failures, 1);
        assert_eq!(stage.stats().inferences, 0);
        assert!(cmd_rx.try_recv().is_err());
        assert!(mailbox.take().is_none());

        drop(rx.try_recv().unwrap());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_detector_failure_without_output_releases_frame() {
        let pool = pool();
        let (cmd_tx, cmd_rx) = bounded(2).unwrap();
        let mut stage =
            TrackingStage::new(StageIo::new(None, None), FailingDetector, ModeSwitch::fixed(true), ControlLaw::default())
                .with_commands(cmd_tx);

        for _ in 0..3 {
            let iteration = stage.process(pool.acquire().unwrap());
            assert_eq!(iteration.handoff, Handoff::Released);
        }
        assert_eq!(stage.stats().failures, 3);
        assert_eq!(stage.stats().released, 3);
        assert!(cmd_rx.try_recv().is_err());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_annotation_outlines_box() {
        let (tx, rx) = bounded(1).unwrap();
        let detector = FixedDetector(vec![Detection::new(BoundingBox::new(10, 10, 20, 20), 0.9)]);
        let mut stage =
            TrackingStage::new(StageIo::new(None, Some(tx)), detector, ModeSwitch::fixed(true), ControlLaw::default())
                .with_annotation(true);

        stage.process(Frame::from_parts(100, 100, PixelFormat::Gray8, vec![0; 10_000]));
        let frame = rx.try_recv().unwrap();
        assert!(frame.luma(10, 15).unwrap() > 0);
        assert_eq!(frame.luma(15, 15), Some(0));
    }
}
