//! Wiring of all stages into one running head.
//!
//! ```text
//! source --frames--> tracking --frames--> display
//!                       |  \
//!                       |   mailbox --> analysis
//!                    commands
//!                       |
//!                  transmission <--> link
//! ```
//!
//! Mode observers are registered in a fixed order: tracking, indicator,
//! display. Shutdown closes the source; every downstream stage ends when its
//! input channel disconnects, and the analysis worker and link listener stop
//! on the shutdown signal.

use crate::{
    analysis::{AnalysisStage, AnalysisStats},
    channel::{bounded, shutdown_pair, ShutdownTrigger, StageIo},
    config::Config,
    detection::Detector,
    display::{Display, DisplayStage, DisplayStats},
    mailbox::DetectionMailbox,
    mode::{display_enabled, tracking_enabled, ModeController, ModeSwitch, OperatingMode},
    source::{FrameSource, SourceStage, SourceStats},
    tracking::{TrackingStage, TrackingStats},
    transmission::{Discovery, Link, TransmissionStage, TransmissionStats},
    Error, Result,
};
use log::info;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Counters of every stage, collected at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineStats {
    pub source: SourceStats,
    pub tracking: TrackingStats,
    pub display: DisplayStats,
    pub transmission: TransmissionStats,
    pub analysis: AnalysisStats,
}

/// Entry point for starting the head
pub struct Pipeline;

impl Pipeline {
    /// Validate `config`, wire every stage and start their threads
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration or a stage thread that
    /// cannot be spawned
    pub fn launch<S, D, P, L>(
        config: &Config,
        source: S,
        detector: D,
        panel: P,
        link: Arc<L>,
    ) -> Result<PipelineHandle<L::Addr>>
    where
        S: FrameSource + 'static,
        D: Detector + 'static,
        P: Display + 'static,
        L: Link + 'static,
    {
        config.validate()?;
        info!("Launching pipeline");

        let controller = Arc::new(ModeController::new(config.pipeline.initial_mode));
        let tracking_switch = ModeSwitch::attach(&controller, "tracking", tracking_enabled);
        let indicator = ModeSwitch::attach(&controller, "indicator", tracking_enabled);
        let display_switch = ModeSwitch::attach(&controller, "display", display_enabled);

        let (frames_tx, frames_rx) = bounded(config.pipeline.frame_capacity)?;
        let (tracked_tx, tracked_rx) = bounded(config.pipeline.frame_capacity)?;
        let (commands_tx, commands_rx) = bounded(config.pipeline.command_capacity)?;
        let mailbox = Arc::new(DetectionMailbox::new());
        let (trigger, shutdown) = shutdown_pair();

        let transmission = TransmissionStage::new(link, Some(commands_rx), shutdown.clone())
            .with_min_interval(config.transmission.min_delay())
            .with_codec(config.transmission.codec());
        let discovery = transmission.discovery();

        let handles = StageHandles {
            transmission: transmission.spawn()?,
            analysis: AnalysisStage::new(Arc::clone(&mailbox), config.pipeline.analysis_interval(), shutdown.clone())
                .spawn()?,
            display: DisplayStage::new(
                StageIo::new(Some(tracked_rx), None),
                panel,
                display_switch,
                config.display.panel_width,
                config.display.panel_height,
            )
            .spawn()?,
            tracking: TrackingStage::new(
                StageIo::new(Some(frames_rx), Some(tracked_tx)),
                detector,
                tracking_switch,
                config.control,
            )
            .with_commands(commands_tx)
            .with_mailbox(mailbox)
            .with_annotation(config.pipeline.annotate)
            .spawn()?,
            source: SourceStage::new(source, Some(frames_tx), shutdown)
                .with_frame_interval(config.source.frame_interval())
                .with_max_frames(config.source.frames)
                .spawn()?,
        };

        Ok(PipelineHandle {
            controller,
            indicator,
            discovery,
            trigger,
            handles,
        })
    }
}

struct StageHandles {
    source: JoinHandle<SourceStats>,
    tracking: JoinHandle<TrackingStats>,
    display: JoinHandle<DisplayStats>,
    transmission: JoinHandle<TransmissionStats>,
    analysis: JoinHandle<AnalysisStats>,
}

/// Control surface of a running pipeline
pub struct PipelineHandle<A> {
    controller: Arc<ModeController>,
    indicator: ModeSwitch,
    discovery: Arc<Discovery<A>>,
    trigger: ShutdownTrigger,
    handles: StageHandles,
}

impl<A: Copy + Eq + std::fmt::Display> PipelineHandle<A> {
    /// Deliver an external mode change event
    pub fn set_mode(&self, mode: OperatingMode) {
        self.controller.set_mode(mode);
    }

    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        self.controller.mode()
    }

    /// Shared mode controller, for additional observers
    #[must_use]
    pub fn controller(&self) -> Arc<ModeController> {
        Arc::clone(&self.controller)
    }

    /// Whether the tracking indicator is lit
    #[must_use]
    pub fn indicator(&self) -> bool {
        self.indicator.is_on()
    }

    /// Base the link is bound to, if any
    #[must_use]
    pub fn peer(&self) -> Option<A> {
        self.discovery.peer()
    }

    /// Whether the source has stopped producing
    #[must_use]
    pub fn is_source_finished(&self) -> bool {
        self.handles.source.is_finished()
    }

    /// Stop the source now and wait for every stage to drain
    ///
    /// # Errors
    ///
    /// Returns an error if a stage thread panicked
    pub fn shutdown(self) -> Result<PipelineStats> {
        info!("Shutting down pipeline");
        self.trigger.trigger();
        Self::join_all(self.handles)
    }

    /// Wait for the source to run out, then stop the remaining workers
    ///
    /// # Errors
    ///
    /// Returns an error if a stage thread panicked
    pub fn join(self) -> Result<PipelineStats> {
        let source = join_stage(self.handles.source, "source")?;
        self.trigger.trigger();
        let mut stats = Self::join_rest(
            self.handles.tracking,
            self.handles.display,
            self.handles.transmission,
            self.handles.analysis,
        )?;
        stats.source = source;
        Ok(stats)
    }

    fn join_all(handles: StageHandles) -> Result<PipelineStats> {
        let source = join_stage(handles.source, "source")?;
        let mut stats = Self::join_rest(handles.tracking, handles.display, handles.transmission, handles.analysis)?;
        stats.source = source;
        Ok(stats)
    }

    fn join_rest(
        tracking: JoinHandle<TrackingStats>,
        display: JoinHandle<DisplayStats>,
        transmission: JoinHandle<TransmissionStats>,
        analysis: JoinHandle<AnalysisStats>,
    ) -> Result<PipelineStats> {
        let stats = PipelineStats {
            source: SourceStats::default(),
            tracking: join_stage(tracking, "tracking")?,
            display: join_stage(display, "display")?,
            transmission: join_stage(transmission, "transmission")?,
            analysis: join_stage(analysis, "analysis")?,
        };
        info!("Pipeline stopped: {stats:?}");
        Ok(stats)
    }
}

fn join_stage<T>(handle: JoinHandle<T>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|_| Error::StagePanicked(format!("{name} stage")))
}
