//! Datagram transport abstraction.
//!
//! [`Datagram`] is the only thing the engine needs from the network: send a
//! byte buffer to an address, receive one with a timeout, and tell a timeout
//! apart from a hard failure.  It is implemented for `std::net::UdpSocket`;
//! [`crate::simulator::Simulator`] wraps any implementation to inject faults.
//!
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Largest datagram we ever read (one MSS is far smaller).
pub const MAX_DATAGRAM: usize = 65_535;

/// An unreliable, unordered datagram socket.
pub trait Datagram {
    /// Open a transport bound to `addr` (port 0 picks an ephemeral port).
    fn bind(addr: SocketAddr) -> io::Result<Self>
    where
        Self: Sized;

    /// Send `buf` as one datagram to `peer`.  Returns the bytes sent.
    fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` when the receive timeout elapsed without a
    /// datagram; `Err` is reserved for hard failures.
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Configure the timeout used by [`recv_from`](Self::recv_from).
    /// `None` blocks indefinitely.
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Address this transport is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Returns true if the error only means "nothing arrived in time".
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Datagram for UdpSocket {
    fn bind(addr: SocketAddr) -> io::Result<Self> {
        UdpSocket::bind(addr)
    }

    fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, peer)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match UdpSocket::recv_from(self, buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if is_timeout(&e) => Ok(None),
            // A previous send hit a closed port (ICMP unreachable on Linux,
            // WSAECONNRESET on Windows); for a datagram protocol that is loss.
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused
                || e.kind() == io::ErrorKind::ConnectionReset =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}
