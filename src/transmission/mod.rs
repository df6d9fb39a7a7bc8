//! Transmission stage: motion commands to the mobile base.
//!
//! Two loops share one link. A listener thread feeds every inbound datagram
//! to the discovery latch; the outbound loop drains the command channel and,
//! once a peer is bound, sends at most one command per minimum interval.
//! Commands arriving before the base has identified itself, or inside the
//! interval, are dropped. Send failures are logged and never retried.

pub mod discovery;
pub mod link;
pub mod rate_limit;

pub use discovery::{Discovery, DiscoveryState, Inbound};
pub use link::{Link, MacAddress, MemoryLink, MemoryMedium, UdpLink};
pub use rate_limit::MinIntervalGate;

use crate::{
    channel::{Receiver, ShutdownListener},
    constants::TRANSMISSION_MIN_DELAY,
    control::MotionCommand,
    protocol::CommandCodec,
    Error, Result,
};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long one listener receive waits before checking for shutdown
const LISTEN_POLL: Duration = Duration::from_millis(50);

/// Counters kept by the transmission stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmissionStats {
    /// Datagrams seen by the listener
    pub datagrams: u64,
    /// Commands taken off the channel
    pub commands: u64,
    /// Dropped because no peer was bound yet
    pub discarded_unbound: u64,
    /// Dropped inside the minimum interval
    pub rate_limited: u64,
    /// Handed to the link
    pub transmitted: u64,
    /// Rejected by the codec or the link
    pub send_failures: u64,
}

/// What happened to one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Discarded,
    RateLimited,
    Sent,
    Failed,
}

/// The transmission worker
pub struct TransmissionStage<L: Link> {
    link: Arc<L>,
    discovery: Arc<Discovery<L::Addr>>,
    commands: Option<Receiver<MotionCommand>>,
    gate: MinIntervalGate,
    codec: CommandCodec,
    shutdown: ShutdownListener,
    stats: TransmissionStats,
}

impl<L: Link> TransmissionStage<L> {
    /// Create the stage on an initialized link; discovery starts immediately
    pub fn new(link: Arc<L>, commands: Option<Receiver<MotionCommand>>, shutdown: ShutdownListener) -> Self {
        let discovery = Arc::new(Discovery::new());
        discovery.start();
        Self {
            link,
            discovery,
            commands,
            gate: MinIntervalGate::new(TRANSMISSION_MIN_DELAY),
            codec: CommandCodec::default(),
            shutdown,
            stats: TransmissionStats::default(),
        }
    }

    #[must_use]
    pub const fn with_min_interval(mut self, interval: Duration) -> Self {
        self.gate = MinIntervalGate::new(interval);
        self
    }

    #[must_use]
    pub const fn with_codec(mut self, codec: CommandCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Shared handle on the peer latch
    #[must_use]
    pub fn discovery(&self) -> Arc<Discovery<L::Addr>> {
        Arc::clone(&self.discovery)
    }

    #[must_use]
    pub const fn stats(&self) -> TransmissionStats {
        self.stats
    }

    /// Decide the fate of one command observed at `now`
    pub fn dispatch(&mut self, command: &MotionCommand, now: Instant) -> Dispatch {
        self.stats.commands += 1;

        let Some(peer) = self.discovery.peer() else {
            self.stats.discarded_unbound += 1;
            debug!("transmission: no peer yet, dropping command");
            return Dispatch::Discarded;
        };

        if !self.gate.is_open(now) {
            self.stats.rate_limited += 1;
            return Dispatch::RateLimited;
        }

        let sent = self
            .codec
            .encode(command)
            .and_then(|payload| self.link.send(peer, &payload));
        match sent {
            Ok(()) => {
                self.gate.mark(now);
                self.stats.transmitted += 1;
                Dispatch::Sent
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("transmission: command to {peer} dropped: {e}");
                Dispatch::Failed
            }
        }
    }

    /// Run until the command channel closes
    pub fn run(mut self) -> TransmissionStats {
        info!("transmission: start on {}", self.link.local_addr());
        let Some(commands) = self.commands.take() else {
            info!("transmission: no command input configured");
            return self.stats;
        };

        let link = Arc::clone(&self.link);
        let discovery = Arc::clone(&self.discovery);
        let shutdown = self.shutdown.clone();
        let done = AtomicBool::new(false);
        let datagrams = AtomicU64::new(0);

        thread::scope(|scope| {
            scope.spawn(|| listen(&*link, &discovery, &shutdown, &done, &datagrams));

            while let Ok(command) = commands.recv() {
                self.dispatch(&command, Instant::now());
            }
            done.store(true, Ordering::Release);
        });

        self.stats.datagrams = datagrams.load(Ordering::Acquire);
        info!("transmission: stop, {:?}", self.stats);
        self.stats
    }
}

impl<L: Link + 'static> TransmissionStage<L> {
    /// Run the stage on its own thread
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned
    pub fn spawn(self) -> Result<JoinHandle<TransmissionStats>> {
        thread::Builder::new()
            .name("transmission".to_string())
            .spawn(move || self.run())
            .map_err(Error::Io)
    }
}

fn listen<L: Link>(
    link: &L,
    discovery: &Discovery<L::Addr>,
    shutdown: &ShutdownListener,
    done: &AtomicBool,
    datagrams: &AtomicU64,
) {
    while !done.load(Ordering::Acquire) && !shutdown.is_triggered() {
        match link.recv(LISTEN_POLL) {
            Ok(Some((from, payload))) => {
                datagrams.fetch_add(1, Ordering::AcqRel);
                discovery.on_receive(link, from, &payload);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("transmission: receive failed: {e}");
                if shutdown.wait(LISTEN_POLL) {
                    break;
                }
            }
        }
    }
    debug!("transmission: listener stopped");
}
