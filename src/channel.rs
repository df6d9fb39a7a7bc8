//! Bounded hand-off between pipeline stages.
//!
//! Stages talk only through fixed-capacity FIFO channels. A full channel
//! blocks the producer and an empty one blocks the consumer, with no timeout:
//! a slow stage slows everything upstream of it.

use crate::{frame::Frame, Error, Result};
use log::warn;

pub use crossbeam_channel::{Receiver, Sender};

/// Create a bounded channel of `capacity` slots
///
/// # Errors
///
/// Returns an error for a zero capacity
pub fn bounded<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>)> {
    if capacity == 0 {
        return Err(Error::InvalidInput("Channel capacity must be greater than 0".to_string()));
    }
    Ok(crossbeam_channel::bounded(capacity))
}

/// Input and output ends of one stage
///
/// A stage without input has nothing to do and its loop ends immediately;
/// a stage without output releases frames back to their origin instead of
/// forwarding them.
#[derive(Debug)]
pub struct StageIo<T> {
    pub input: Option<Receiver<T>>,
    pub output: Option<Sender<T>>,
}

impl<T> StageIo<T> {
    #[must_use]
    pub const fn new(input: Option<Receiver<T>>, output: Option<Sender<T>>) -> Self {
        Self { input, output }
    }

    /// Block until the next item arrives
    ///
    /// Returns `None` when the stage has no input or every sender is gone,
    /// which ends the stage loop.
    pub fn receive(&self) -> Option<T> {
        self.input.as_ref()?.recv().ok()
    }
}

/// What happened to a frame at the end of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Sent to the next stage
    Forwarded,
    /// Returned to its origin
    Released,
}

/// Pass a frame on, or release it when there is nowhere to send it
///
/// A disconnected downstream stage hands the frame back through the send
/// error, so it is released here rather than lost.
pub fn hand_off(output: Option<&Sender<Frame>>, frame: Frame, stage: &str) -> Handoff {
    match output {
        Some(tx) => match tx.send(frame) {
            Ok(()) => Handoff::Forwarded,
            Err(err) => {
                warn!("{stage}: downstream closed, releasing frame");
                err.into_inner().release();
                Handoff::Released
            }
        },
        None => {
            frame.release();
            Handoff::Released
        }
    }
}

/// Create a linked shutdown trigger and listener
///
/// Dropping the trigger signals every clone of the listener.
#[must_use]
pub fn shutdown_pair() -> (ShutdownTrigger, ShutdownListener) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (ShutdownTrigger { _tx: tx }, ShutdownListener { rx })
}

/// Owner side of a shutdown signal; dropping it requests shutdown
#[derive(Debug)]
pub struct ShutdownTrigger {
    _tx: Sender<()>,
}

impl ShutdownTrigger {
    pub fn trigger(self) {
        drop(self);
    }
}

/// Worker side of a shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: Receiver<()>,
}

impl ShutdownListener {
    /// Sleep up to `timeout`, returning `true` as soon as shutdown is requested
    #[must_use]
    pub fn wait(&self, timeout: std::time::Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(crossbeam_channel::RecvTimeoutError::Timeout))
    }

    /// Non-blocking check
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(crossbeam_channel::TryRecvError::Disconnected) | Ok(()))
    }
}
