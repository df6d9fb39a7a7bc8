//! Best-effort datagram links.
//!
//! The camera and the base share a broadcast medium without delivery
//! guarantees. A unicast destination has to be registered with
//! [`Link::add_peer`] before anything can be sent to it; the broadcast
//! address is always reachable.

use crate::{constants::MAX_PAYLOAD_LEN, Error, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// A broadcast-capable datagram medium
pub trait Link: Send + Sync {
    /// Address of a station on this medium
    type Addr: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Address that reaches every station
    fn broadcast_addr(&self) -> Self::Addr;

    /// Address of this station
    fn local_addr(&self) -> Self::Addr;

    /// Allow unicast sends to `peer`
    ///
    /// # Errors
    ///
    /// Returns an error if the medium refuses the registration
    fn add_peer(&self, peer: Self::Addr) -> Result<()>;

    /// Send one datagram, without acknowledgement
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkSend`] when the datagram could not be handed to
    /// the medium
    fn send(&self, dest: Self::Addr, payload: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for one datagram
    ///
    /// # Errors
    ///
    /// Returns an error if the medium failed, `Ok(None)` on timeout
    fn recv(&self, timeout: Duration) -> Result<Option<(Self::Addr, Vec<u8>)>>;

    /// Largest payload accepted by [`Link::send`]
    fn max_payload(&self) -> usize {
        MAX_PAYLOAD_LEN
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// UDP link standing in for the wireless medium on a host
pub struct UdpLink {
    socket: UdpSocket,
    local: SocketAddr,
    broadcast: SocketAddr,
    peers: Mutex<HashSet<SocketAddr>>,
}

impl UdpLink {
    /// Bind a socket and enable broadcast
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkInit`] if the socket cannot be set up
    pub fn bind(bind: SocketAddr, broadcast: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind).map_err(|e| Error::LinkInit(format!("bind {bind}: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::LinkInit(format!("enable broadcast: {e}")))?;
        let local = socket
            .local_addr()
            .map_err(|e| Error::LinkInit(format!("local address: {e}")))?;
        info!("UDP link on {local}, broadcast {broadcast}");

        Ok(Self {
            socket,
            local,
            broadcast,
            peers: Mutex::new(HashSet::new()),
        })
    }
}

impl Link for UdpLink {
    type Addr = SocketAddr;

    fn broadcast_addr(&self) -> SocketAddr {
        self.broadcast
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn add_peer(&self, peer: SocketAddr) -> Result<()> {
        lock(&self.peers).insert(peer);
        Ok(())
    }

    fn send(&self, dest: SocketAddr, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload() {
            return Err(Error::LinkSend(format!("payload of {} bytes is too large", payload.len())));
        }
        if dest != self.broadcast && !lock(&self.peers).contains(&dest) {
            return Err(Error::LinkSend(format!("{dest} is not a registered peer")));
        }
        self.socket
            .send_to(payload, dest)
            .map(|_| ())
            .map_err(|e| Error::LinkSend(format!("send to {dest}: {e}")))
    }

    fn recv(&self, timeout: Duration) -> Result<Option<(SocketAddr, Vec<u8>)>> {
        self.socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut buf = [0u8; 1500];
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => Ok(Some((from, buf[..len].to_vec()))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Six-byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: Self = Self([0xFF; 6]);
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

type Datagram = (MacAddress, Vec<u8>);

/// In-process broadcast medium shared by [`MemoryLink`] stations
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    stations: Arc<Mutex<HashMap<MacAddress, Sender<Datagram>>>>,
}

impl MemoryMedium {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a station with address `addr`
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkInit`] for the broadcast address or an address
    /// already in use
    pub fn join(&self, addr: MacAddress) -> Result<MemoryLink> {
        if addr == MacAddress::BROADCAST {
            return Err(Error::LinkInit("cannot join with the broadcast address".to_string()));
        }
        let mut stations = lock(&self.stations);
        if stations.contains_key(&addr) {
            return Err(Error::LinkInit(format!("address {addr} already in use")));
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        stations.insert(addr, tx);
        debug!("Station {addr} joined the medium");

        Ok(MemoryLink {
            addr,
            medium: self.clone(),
            inbox: rx,
            peers: Mutex::new(HashSet::new()),
            fail_sends: AtomicBool::new(false),
            sent: AtomicU64::new(0),
        })
    }

    fn deliver(&self, from: MacAddress, dest: MacAddress, payload: &[u8]) {
        let stations = lock(&self.stations);
        if dest == MacAddress::BROADCAST {
            for (addr, tx) in stations.iter() {
                if *addr != from {
                    let _ = tx.send((from, payload.to_vec()));
                }
            }
        } else if let Some(tx) = stations.get(&dest) {
            let _ = tx.send((from, payload.to_vec()));
        }
    }
}

/// Station on a [`MemoryMedium`]
pub struct MemoryLink {
    addr: MacAddress,
    medium: MemoryMedium,
    inbox: Receiver<Datagram>,
    peers: Mutex<HashSet<MacAddress>>,
    fail_sends: AtomicBool,
    sent: AtomicU64,
}

impl MemoryLink {
    /// Make every following send fail, as a lost radio would
    pub fn set_send_failure(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// Datagrams handed to the medium so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Acquire)
    }

    /// Registered unicast peers
    #[must_use]
    pub fn peers(&self) -> Vec<MacAddress> {
        lock(&self.peers).iter().copied().collect()
    }
}

impl Link for MemoryLink {
    type Addr = MacAddress;

    fn broadcast_addr(&self) -> MacAddress {
        MacAddress::BROADCAST
    }

    fn local_addr(&self) -> MacAddress {
        self.addr
    }

    fn add_peer(&self, peer: MacAddress) -> Result<()> {
        lock(&self.peers).insert(peer);
        Ok(())
    }

    fn send(&self, dest: MacAddress, payload: &[u8]) -> Result<()> {
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(Error::LinkSend(format!("radio down, dropping datagram to {dest}")));
        }
        if payload.len() > self.max_payload() {
            return Err(Error::LinkSend(format!("payload of {} bytes is too large", payload.len())));
        }
        if dest != MacAddress::BROADCAST && !lock(&self.peers).contains(&dest) {
            return Err(Error::LinkSend(format!("{dest} is not a registered peer")));
        }
        self.medium.deliver(self.addr, dest, payload);
        self.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<Option<(MacAddress, Vec<u8>)>> {
        match self.inbox.recv_timeout(timeout) {
            Ok(datagram) => Ok(Some(datagram)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed(format!("station {} left", self.addr))),
        }
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        lock(&self.medium.stations).remove(&self.addr);
    }
}
