//! Peer discovery latch.
//!
//! The camera starts out discovering. The first datagram carrying the base's
//! identification token binds its sender as the one and only peer for the
//! rest of the process: the address is registered for unicast and answered
//! with the acknowledgement token. Later identifications from other stations
//! are ignored; the bound peer itself is acknowledged again so a base that
//! restarted can finish its handshake.

use super::link::Link;
use crate::constants::ACKNOWLEDGEMENT_TOKEN;
use crate::protocol::is_identification;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Where the handshake stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Link not up yet
    Uninitialized,
    /// Waiting for the base to identify itself
    Discovering,
    /// Peer latched
    Bound,
}

impl DiscoveryState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Discovering => 1,
            Self::Bound => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Discovering,
            2 => Self::Bound,
            _ => Self::Uninitialized,
        }
    }
}

/// What an inbound datagram did to the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<A> {
    /// The sender is now the bound peer
    Bound(A),
    /// The bound peer identified itself again and was re-acknowledged
    Reacknowledged(A),
    /// Identification from a station other than the bound peer
    Rejected(A),
    /// Not an identification, or discovery has not started
    Ignored,
}

/// Write-once peer binding
///
/// Safe to drive from the link's receive thread while the outbound loop
/// reads [`Discovery::peer`].
#[derive(Debug)]
pub struct Discovery<A> {
    state: AtomicU8,
    peer: OnceLock<A>,
}

impl<A> Default for Discovery<A> {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(DiscoveryState::Uninitialized.as_u8()),
            peer: OnceLock::new(),
        }
    }
}

impl<A: Copy + Eq + std::fmt::Display> Discovery<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening for identifications
    pub fn start(&self) {
        let _ = self.state.compare_exchange(
            DiscoveryState::Uninitialized.as_u8(),
            DiscoveryState::Discovering.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    #[must_use]
    pub fn state(&self) -> DiscoveryState {
        DiscoveryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The bound peer, once the handshake has completed
    #[must_use]
    pub fn peer(&self) -> Option<A> {
        if self.state() == DiscoveryState::Bound {
            self.peer.get().copied()
        } else {
            None
        }
    }

    /// Feed one inbound datagram
    pub fn on_receive<L: Link<Addr = A>>(&self, link: &L, from: A, payload: &[u8]) -> Inbound<A> {
        if self.state() == DiscoveryState::Uninitialized || !is_identification(payload) {
            return Inbound::Ignored;
        }

        if self.peer.set(from).is_ok() {
            if let Err(e) = link.add_peer(from) {
                warn!("discovery: registering {from} failed: {e}");
            }
            self.acknowledge(link, from);
            self.state.store(DiscoveryState::Bound.as_u8(), Ordering::Release);
            info!("discovery: bound to {from}");
            return Inbound::Bound(from);
        }

        match self.peer.get() {
            Some(bound) if *bound == from => {
                debug!("discovery: {from} identified again");
                self.acknowledge(link, from);
                Inbound::Reacknowledged(from)
            }
            _ => {
                debug!("discovery: ignoring {from}, already bound");
                Inbound::Rejected(from)
            }
        }
    }

    fn acknowledge<L: Link<Addr = A>>(&self, link: &L, to: A) {
        if let Err(e) = link.send(to, ACKNOWLEDGEMENT_TOKEN) {
            warn!("discovery: acknowledgement to {to} failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::IDENTIFICATION_TOKEN;
    use crate::protocol::is_acknowledgement;
    use crate::transmission::link::{MacAddress, MemoryMedium};
    use std::time::Duration;

    const CAMERA: MacAddress = MacAddress([2, 0, 0, 0, 0, 1]);
    const BASE: MacAddress = MacAddress([2, 0, 0, 0, 0, 2]);
    const INTRUDER: MacAddress = MacAddress([2, 0, 0, 0, 0, 3]);

    #[test]
    fn test_ignored_before_start_and_for_other_payloads() {
        let medium = MemoryMedium::new();
        let camera = medium.join(CAMERA).unwrap();
        let discovery = Discovery::new();

        assert_eq!(discovery.on_receive(&camera, BASE, IDENTIFICATION_TOKEN), Inbound::Ignored);
        discovery.start();
        assert_eq!(discovery.state(), DiscoveryState::Discovering);
        assert_eq!(discovery.on_receive(&camera, BASE, b"1.00,0.00,0.00\0"), Inbound::Ignored);
        assert!(discovery.peer().is_none());
    }

    #[test]
    fn test_unterminated_identification_does_not_bind() {
        let medium = MemoryMedium::new();
        let camera = medium.join(CAMERA).unwrap();
        let discovery = Discovery::new();
        discovery.start();

        let unterminated = &IDENTIFICATION_TOKEN[..IDENTIFICATION_TOKEN.len() - 1];
        assert_eq!(discovery.on_receive(&camera, BASE, unterminated), Inbound::Ignored);
        assert_eq!(discovery.state(), DiscoveryState::Discovering);
        assert_eq!(camera.sent(), 0);
        assert!(camera.peers().is_empty());
    }

    #[test]
    fn test_first_match_binds_and_acknowledges() {
        let medium = MemoryMedium::new();
        let camera = medium.join(CAMERA).unwrap();
        let base = medium.join(BASE).unwrap();
        let discovery = Discovery::new();
        discovery.start();

        assert_eq!(discovery.on_receive(&camera, BASE, IDENTIFICATION_TOKEN), Inbound::Bound(BASE));
        assert_eq!(discovery.state(), DiscoveryState::Bound);
        assert_eq!(discovery.peer(), Some(BASE));
        assert_eq!(camera.peers(), vec![BASE]);

        let (from, payload) = base.recv(Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(from, CAMERA);
        assert!(is_acknowledgement(&payload));
    }

    #[test]
    fn test_binding_is_latched() {
        let medium = MemoryMedium::new();
        let camera = medium.join(CAMERA).unwrap();
        let discovery = Discovery::new();
        discovery.start();

        discovery.on_receive(&camera, BASE, IDENTIFICATION_TOKEN);
        assert_eq!(discovery.on_receive(&camera, INTRUDER, IDENTIFICATION_TOKEN), Inbound::Rejected(INTRUDER));
        assert_eq!(discovery.on_receive(&camera, BASE, IDENTIFICATION_TOKEN), Inbound::Reacknowledged(BASE));
        assert_eq!(discovery.peer(), Some(BASE));
    }
}
