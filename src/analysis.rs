//! Low-priority consumer of the detection mailbox.
//!
//! Runs on its own thread, wakes every `interval`, takes whatever set the
//! tracking stage left in the mailbox and logs it. It never touches the
//! frame or command paths.

use crate::{
    channel::ShutdownListener,
    detection::{aggregate_region, Detection},
    mailbox::DetectionMailbox,
    Error, Result,
};
use log::{debug, info};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Summary of what the analysis worker has seen
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisStats {
    /// Detection sets taken from the mailbox
    pub sets: u64,
    /// Sets that contained at least one face
    pub non_empty_sets: u64,
    /// Faces seen over all sets
    pub detections: u64,
    /// Largest number of faces in one set
    pub max_faces: usize,
    /// Best confidence seen so far
    pub best_score: f32,
}

impl AnalysisStats {
    fn record(&mut self, detections: &[Detection]) {
        self.sets += 1;
        if detections.is_empty() {
            return;
        }
        self.non_empty_sets += 1;
        self.detections += detections.len() as u64;
        self.max_faces = self.max_faces.max(detections.len());
        for d in detections {
            self.best_score = self.best_score.max(d.score);
        }
    }
}

/// The analysis worker
pub struct AnalysisStage {
    mailbox: Arc<DetectionMailbox>,
    interval: Duration,
    shutdown: ShutdownListener,
    stats: AnalysisStats,
}

impl AnalysisStage {
    #[must_use]
    pub fn new(mailbox: Arc<DetectionMailbox>, interval: Duration, shutdown: ShutdownListener) -> Self {
        Self {
            mailbox,
            interval,
            shutdown,
            stats: AnalysisStats::default(),
        }
    }

    /// Take and inspect the pending set, if there is one
    pub fn poll(&mut self) -> Option<usize> {
        let detections = self.mailbox.take()?;
        for (i, d) in detections.iter().enumerate() {
            debug!(
                "analysis: [{i}] score {:.2} box ({}, {}, {}, {})",
                d.score, d.bbox.left, d.bbox.top, d.bbox.right, d.bbox.bottom
            );
        }
        if let Some(region) = aggregate_region(&detections) {
            debug!("analysis: {} face(s) within {:?}", detections.len(), region);
        }
        self.stats.record(&detections);
        Some(detections.len())
    }

    #[must_use]
    pub const fn stats(&self) -> AnalysisStats {
        self.stats
    }

    /// Poll until shutdown is requested, then drain once more
    pub fn run(mut self) -> AnalysisStats {
        info!("analysis: start, polling every {:?}", self.interval);
        while !self.shutdown.wait(self.interval) {
            self.poll();
        }
        self.poll();
        info!("analysis: stop, {:?}", self.stats);
        self.stats
    }

    /// Run the worker on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(self) -> Result<JoinHandle<AnalysisStats>> {
        thread::Builder::new()
            .name("analysis".to_string())
            .spawn(move || self.run())
            .map_err(Error::Io)
    }
}
