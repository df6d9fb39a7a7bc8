//! Mobile-base side of the command link.
//!
//! The base broadcasts its identification token until the camera answers
//! with the acknowledgement token, then listens for command payloads from
//! that camera. An acknowledgement arriving later means the camera asks for
//! the handshake again. When no command has arrived for the silence timeout
//! the base holds position.

use crate::{
    constants::{DEFAULT_CONNECTION_TIMEOUT, DEFAULT_SILENCE_TIMEOUT, IDENTIFICATION_TOKEN},
    control::MotionCommand,
    protocol::{is_acknowledgement, is_identification, CommandCodec},
    transmission::Link,
    Error, Result,
};
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Pause between two identification broadcasts
const HANDSHAKE_RETRY: Duration = Duration::from_millis(1000);

/// Counters kept by the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub handshakes: u64,
    pub commands: u64,
    pub malformed: u64,
    pub holds: u64,
    pub ignored: u64,
}

/// Handshake client and command poller
pub struct CommandReceiver<L: Link> {
    link: L,
    camera: Option<L::Addr>,
    connection_timeout: Duration,
    handshake_retry: Duration,
    silence_timeout: Duration,
    stats: ReceiverStats,
}

impl<L: Link> CommandReceiver<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            camera: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            handshake_retry: HANDSHAKE_RETRY,
            silence_timeout: DEFAULT_SILENCE_TIMEOUT,
            stats: ReceiverStats::default(),
        }
    }

    /// Give up a handshake after `timeout`
    #[must_use]
    pub const fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Re-broadcast the identification every `retry`
    #[must_use]
    pub const fn with_handshake_retry(mut self, retry: Duration) -> Self {
        self.handshake_retry = retry;
        self
    }

    /// Hold position after `timeout` without a command
    #[must_use]
    pub const fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.silence_timeout = timeout;
        self
    }

    /// Camera this base is paired with
    #[must_use]
    pub const fn camera(&self) -> Option<L::Addr> {
        self.camera
    }

    #[must_use]
    pub const fn stats(&self) -> ReceiverStats {
        self.stats
    }

    #[must_use]
    pub const fn link(&self) -> &L {
        &self.link
    }

    /// Run the handshake with the configured connection timeout
    ///
    /// # Errors
    ///
    /// See [`CommandReceiver::connect_within`]
    pub fn connect(&mut self) -> Result<L::Addr> {
        self.connect_within(self.connection_timeout)
    }

    /// Broadcast the identification until a camera acknowledges it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when no acknowledgement arrives within
    /// `timeout`, or the link error that stopped the handshake
    pub fn connect_within(&mut self, timeout: Duration) -> Result<L::Addr> {
        let deadline = Instant::now() + timeout;
        info!("receiver: looking for a camera");

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout(format!("no camera answered within {timeout:?}")));
            }
            if let Err(e) = self.link.send(self.link.broadcast_addr(), IDENTIFICATION_TOKEN) {
                warn!("receiver: identification broadcast failed: {e}");
            }

            let window_end = (now + self.handshake_retry).min(deadline);
            while let Some(remaining) = window_end.checked_duration_since(Instant::now()) {
                if remaining.is_zero() {
                    break;
                }
                match self.link.recv(remaining)? {
                    Some((from, payload)) if is_acknowledgement(&payload) => {
                        self.link.add_peer(from)?;
                        self.camera = Some(from);
                        self.stats.handshakes += 1;
                        info!("receiver: paired with camera {from}");
                        return Ok(from);
                    }
                    Some((from, _)) => {
                        self.stats.ignored += 1;
                        debug!("receiver: ignoring datagram from {from} while connecting");
                    }
                    None => break,
                }
            }
        }
    }

    /// Wait up to `timeout` for one command from the paired camera
    ///
    /// # Errors
    ///
    /// Returns a link error, or the handshake error when the camera asked to
    /// reconnect and did not answer
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<MotionCommand>> {
        let Some((from, payload)) = self.link.recv(timeout)? else {
            return Ok(None);
        };

        if is_acknowledgement(&payload) {
            info!("receiver: camera {from} requested a new handshake");
            self.connect()?;
            return Ok(None);
        }
        if self.camera != Some(from) || is_identification(&payload) {
            self.stats.ignored += 1;
            return Ok(None);
        }

        match CommandCodec::decode(&payload) {
            Ok(command) => {
                self.stats.commands += 1;
                Ok(Some(command))
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!("receiver: {e}");
                Ok(None)
            }
        }
    }

    /// Next command to drive with: the next one received, or hold once the
    /// silence timeout passes without any
    ///
    /// # Errors
    ///
    /// See [`CommandReceiver::poll`]
    pub fn next_drive(&mut self) -> Result<MotionCommand> {
        let deadline = Instant::now() + self.silence_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.stats.holds += 1;
                debug!("receiver: target lost, holding");
                return Ok(MotionCommand::HOLD);
            }
            if let Some(command) = self.poll(remaining)? {
                return Ok(command);
            }
        }
    }
}
