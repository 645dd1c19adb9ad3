//! Per-connection lifecycle: open, bind, handshake, teardown.
//!
//! A [`Connection`] owns everything one microTCP session needs: the datagram
//! transport, the FSM state, the send/receive engines and the counters.
//! Data transfer (`send` / `recv`) lives in [`crate::transfer`]; this module
//! owns the segment I/O helpers both halves share.
//!
//! # Handshake
//!
//! ```text
//!  Initiator (connect)                         Responder (accept)
//!      │                                            │  LISTEN
//!      │──── SYN seq=x ───────────────────────────▶│
//!      │◀─── SYN|ACK seq=y ack=x+1 ────────────────│
//!      │──── ACK seq=x+1 ack=y+1 ─────────────────▶│
//!  ESTABLISHED                                 ESTABLISHED
//! ```
//!
//! # Teardown (initiator only)
//!
//! ```text
//!  Initiator (shutdown)                        Responder (in recv/send)
//!      │──── FIN|ACK seq=s ───────────────────────▶│
//!      │◀─── ACK ack=s+1 ──────────────────────────│  CLOSING_BY_PEER
//!  CLOSING_BY_HOST                                  │
//!      │◀─── FIN|ACK seq=t ack=s+1 ────────────────│
//!      │──── ACK ack=t+1 ─────────────────────────▶│  CLOSED
//!  (linger one timeout)
//!  CLOSED
//! ```
//!
//! Every wait is bounded by the configured receive timeout and every
//! retransmission loop by `max_retries`, except `accept`'s wait for the
//! first SYN, which blocks until one arrives.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Instant;

use rand::Rng;

use crate::config::Config;
use crate::error::{ConnError, Result};
use crate::packet::{flags, Segment};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::state::{ConnectionState, Role};
use crate::stats::Stats;
use crate::timer::RetryTimer;
use crate::transport::{Datagram, MAX_DATAGRAM};

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

/// Outcome of one bounded wait on the transport.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// A valid segment arrived.
    Segment(Segment, SocketAddr),
    /// A datagram arrived but was unusable (corrupt, or from a stranger).
    Discarded,
    /// The deadline passed with nothing received.
    Timeout,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// A reliable byte-stream connection over a datagram transport.
///
/// All operations block for at most the configured receive timeout per
/// attempt.  Methods take `&mut self`; sharing a connection between threads
/// requires external locking.
pub struct Connection<T: Datagram = UdpSocket> {
    pub(crate) transport: Option<T>,
    pub(crate) state: ConnectionState,
    pub(crate) role: Option<Role>,
    pub(crate) config: Config,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) sender: Sender,
    pub(crate) receiver: Receiver,
    negotiated_window: usize,
    pub(crate) stats: Stats,
    scratch: Vec<u8>,
}

impl Connection<UdpSocket> {
    /// Create an unbound UDP-backed connection with the default
    /// configuration.
    pub fn open() -> Self {
        Self::with_config(Config::default())
    }
}

impl<T: Datagram> Connection<T> {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Create an unbound connection in [`ConnectionState::Ready`].
    pub fn with_config(config: Config) -> Self {
        Self {
            transport: None,
            state: ConnectionState::Ready,
            role: None,
            sender: Sender::new(0, 0, &config),
            receiver: Receiver::new(0, 0),
            negotiated_window: 0,
            peer: None,
            stats: Stats::default(),
            scratch: vec![0u8; MAX_DATAGRAM],
            config,
        }
    }

    /// Wrap an already bound transport; the connection starts in
    /// [`ConnectionState::Listen`].
    pub fn from_transport(transport: T, config: Config) -> Self {
        let mut conn = Self::with_config(config);
        conn.transport = Some(transport);
        conn.state = ConnectionState::Listen;
        conn
    }

    /// Bind to a local IPv4 address and move to `LISTEN`.
    ///
    /// An IPv6 address leaves the connection [`ConnectionState::Invalid`].
    pub fn bind(&mut self, addr: SocketAddr) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(ConnError::BadState {
                op: "bind",
                state: self.state,
            });
        }
        if !addr.is_ipv4() {
            self.state = ConnectionState::Invalid;
            return Err(ConnError::UnsupportedAddressFamily(addr));
        }
        self.transport = Some(T::bind(addr)?);
        self.state = ConnectionState::Listen;
        log::debug!("[microtcp] bound to {}", self.local_addr()?);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Which side of the handshake this connection played, once established.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Remote address, while a session is open.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.transport {
            Some(t) => Ok(t.local_addr()?),
            None => Err(ConnError::BadState {
                op: "local_addr",
                state: self.state,
            }),
        }
    }

    /// `min(local, peer)` advertised window agreed during the handshake.
    pub fn negotiated_window(&self) -> usize {
        self.negotiated_window
    }

    /// Window most recently advertised by the peer.
    pub fn peer_window(&self) -> usize {
        self.sender.peer_window
    }

    /// Sequence number the next payload byte will carry.
    pub fn send_seq(&self) -> u32 {
        self.sender.next_seq
    }

    /// Cumulative ACK frontier (next sequence number expected from the peer).
    pub fn recv_frontier(&self) -> u32 {
        self.receiver.ack_number()
    }

    /// Direct access to the transport, e.g. to script simulator faults.
    pub fn transport_mut(&mut self) -> Option<&mut T> {
        self.transport.as_mut()
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Active open: three-way handshake with `peer`.
    ///
    /// From `READY` an ephemeral local port is bound first.  Exhausting the
    /// retry budget returns [`ConnError::HandshakeFailed`] and restores the
    /// state the call started from.
    pub fn connect(&mut self, peer: SocketAddr) -> Result<()> {
        if !self.state.can_open() {
            return Err(ConnError::BadState {
                op: "connect",
                state: self.state,
            });
        }
        if !peer.is_ipv4() {
            return Err(ConnError::UnsupportedAddressFamily(peer));
        }
        if self.transport.is_none() {
            self.transport = Some(T::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?);
        }

        let isn = random_isn();
        let syn = Segment::new(isn, 0, flags::SYN, self.config.advertised_window(), vec![]);
        let bits = syn.encode();
        let mut timer = self.retry_timer();

        loop {
            self.transmit(&bits, peer)?;
            log::debug!("[microtcp] → SYN seq={isn} to {peer}");

            let deadline = Instant::now() + timer.timeout();
            loop {
                match self.recv_segment(deadline)? {
                    Incoming::Segment(seg, from)
                        if from == peer
                            && seg.header.is_exactly(flags::SYN | flags::ACK)
                            && seg.header.ack == isn.wrapping_add(1) =>
                    {
                        self.establish(Role::Initiator, peer, isn, &seg);
                        self.send_ack()?;
                        return Ok(());
                    }
                    Incoming::Segment(seg, from) => {
                        log::debug!(
                            "[microtcp] ignoring {} from {from} while awaiting SYN|ACK",
                            flags::describe(seg.header.control)
                        );
                    }
                    Incoming::Discarded => {}
                    Incoming::Timeout => break,
                }
            }

            if !timer.expire() {
                log::warn!("[microtcp] handshake with {peer} failed after {} attempts", timer.attempts());
                return Err(ConnError::HandshakeFailed {
                    attempts: timer.attempts(),
                });
            }
            log::warn!("[microtcp] SYN timeout, retransmitting (attempt {})", timer.attempts());
        }
    }

    /// Passive open: wait for a SYN and complete the handshake.
    ///
    /// Blocks until a SYN arrives; the SYN|ACK phase is bounded.  Returns the
    /// peer's address.  On failure the connection stays in `LISTEN`.
    pub fn accept(&mut self) -> Result<SocketAddr> {
        if self.state != ConnectionState::Listen {
            return Err(ConnError::BadState {
                op: "accept",
                state: self.state,
            });
        }

        let (syn, peer) = loop {
            let deadline = Instant::now() + self.config.recv_timeout;
            if let Incoming::Segment(seg, from) = self.recv_segment(deadline)? {
                if seg.header.is_exactly(flags::SYN) {
                    break (seg, from);
                }
            }
        };
        log::debug!("[microtcp] ← SYN seq={} from {peer}", syn.header.seq);

        let isn = random_isn();
        let synack = Segment::new(
            isn,
            syn.header.seq.wrapping_add(1),
            flags::SYN | flags::ACK,
            self.config.advertised_window(),
            vec![],
        );
        let bits = synack.encode();
        let mut timer = self.retry_timer();

        loop {
            self.transmit(&bits, peer)?;
            log::debug!("[microtcp] → SYN|ACK seq={isn} ack={}", synack.header.ack);

            let deadline = Instant::now() + timer.timeout();
            loop {
                match self.recv_segment(deadline)? {
                    Incoming::Segment(seg, from) if from == peer => {
                        let h = seg.header;
                        if h.is_exactly(flags::SYN) {
                            // Our SYN|ACK was lost.
                            self.transmit(&bits, peer)?;
                            log::debug!("[microtcp] ← duplicate SYN; → SYN|ACK again");
                        } else if h.has(flags::ACK)
                            && !h.has(flags::SYN)
                            && h.ack == isn.wrapping_add(1)
                        {
                            self.establish(Role::Responder, peer, isn, &syn);
                            if !seg.payload.is_empty() {
                                // The pure ACK was lost; this is the first data segment.
                                self.absorb_data(h.seq, seg.payload)?;
                            }
                            return Ok(peer);
                        }
                    }
                    Incoming::Segment(..) | Incoming::Discarded => {}
                    Incoming::Timeout => break,
                }
            }

            if !timer.expire() {
                log::warn!("[microtcp] handshake with {peer} failed after {} attempts", timer.attempts());
                return Err(ConnError::HandshakeFailed {
                    attempts: timer.attempts(),
                });
            }
            log::warn!("[microtcp] SYN|ACK timeout, retransmitting (attempt {})", timer.attempts());
        }
    }

    /// Record the outcome of a completed handshake.
    ///
    /// `isn` is our initial sequence number and `theirs` the segment that
    /// carried the peer's (SYN or SYN|ACK).
    fn establish(&mut self, role: Role, peer: SocketAddr, isn: u32, theirs: &Segment) {
        let peer_window = usize::from(theirs.header.window);
        let local_window = usize::from(self.config.advertised_window());

        self.negotiated_window = local_window.min(peer_window);
        self.sender = Sender::new(isn.wrapping_add(1), peer_window, &self.config);
        self.receiver = Receiver::new(
            theirs.header.seq.wrapping_add(1),
            self.config.recv_buffer_len,
        );
        self.peer = Some(peer);
        self.role = Some(role);
        self.state = ConnectionState::Established;
        log::info!(
            "[microtcp] established with {peer} as {role:?} (window {})",
            self.negotiated_window
        );
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Host-initiated orderly close.
    ///
    /// Only the side that called `connect` may shut down; `CLOSED` is a
    /// no-op.  A failed attempt can be retried: calling `shutdown` again
    /// from `CLOSING_BY_HOST` resumes waiting for the peer's FIN.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Established | ConnectionState::ClosingByHost => {}
            state => return Err(ConnError::BadState { op: "shutdown", state }),
        }
        if self.role != Some(Role::Initiator) {
            return Err(ConnError::ShutdownNotPermitted);
        }
        let peer = self.peer()?;

        let mut peer_fin = None;
        if self.state == ConnectionState::Established {
            peer_fin = self.send_fin_and_await_ack(peer)?;
        }
        if peer_fin.is_none() {
            self.await_peer_fin()?;
        }
        self.send_ack()?;
        log::debug!("[microtcp] → final ACK ack={}", self.receiver.ack_number());

        self.linger()?;
        self.close();
        Ok(())
    }


    /// Send our FIN|ACK until it is acknowledged; moves to `CLOSING_BY_HOST`.
    ///
    /// Returns the peer's FIN sequence number when the acknowledgement came
    /// piggybacked on the peer's own FIN|ACK.
    fn send_fin_and_await_ack(&mut self, peer: SocketAddr) -> Result<Option<u32>> {
        let fin_seq = self.sender.next_seq;
        let fin = Segment::new(
            fin_seq,
            self.receiver.ack_number(),
            flags::FIN | flags::ACK,
            self.receiver.window_size(),
            vec![],
        );
        let bits = fin.encode();
        let mut timer = self.retry_timer();

        loop {
            self.transmit(&bits, peer)?;
            log::debug!("[microtcp] → FIN|ACK seq={fin_seq}");

            let deadline = Instant::now() + timer.timeout();
            loop {
                let seg = match self.recv_segment(deadline)? {
                    Incoming::Segment(seg, _) => seg,
                    Incoming::Discarded => continue,
                    Incoming::Timeout => break,
                };
                let h = seg.header;
                if h.is_exactly(flags::SYN | flags::ACK) {
                    self.send_ack()?;
                    continue;
                }
                // Data behind our FIN is not delivered; the frontier stays
                // where the FIN|ACK announced it.
                if h.has(flags::ACK) && h.ack == fin_seq.wrapping_add(1) {
                    self.sender.next_seq = fin_seq.wrapping_add(1);
                    self.state = ConnectionState::ClosingByHost;
                    log::debug!("[microtcp] ← ACK of FIN; state {}", self.state);
                    if h.has(flags::FIN) && self.receiver.on_fin(h.seq) {
                        return Ok(Some(h.seq));
                    }
                    return Ok(None);
                }
            }

            if !timer.expire() {
                log::warn!("[microtcp] FIN not acknowledged after {} attempts", timer.attempts());
                return Err(ConnError::ShutdownFailed {
                    attempts: timer.attempts(),
                });
            }
            log::warn!("[microtcp] FIN timeout, retransmitting (attempt {})", timer.attempts());
        }
    }

    /// Wait in `CLOSING_BY_HOST` for the peer's FIN|ACK.
    fn await_peer_fin(&mut self) -> Result<()> {
        let mut timer = self.retry_timer();
        loop {
            let deadline = Instant::now() + timer.timeout();
            loop {
                let seg = match self.recv_segment(deadline)? {
                    Incoming::Segment(seg, _) => seg,
                    Incoming::Discarded => continue,
                    Incoming::Timeout => break,
                };
                let h = seg.header;
                if h.has(flags::FIN) && self.receiver.on_fin(h.seq) {
                    log::debug!("[microtcp] ← FIN|ACK seq={}", h.seq);
                    return Ok(());
                }
            }
            if !timer.expire() {
                log::warn!("[microtcp] peer FIN never arrived after {} timeouts", timer.attempts());
                return Err(ConnError::ShutdownFailed {
                    attempts: timer.attempts(),
                });
            }
        }
    }

    /// Stay one receive timeout after the final ACK, re-acknowledging any
    /// retransmitted peer FIN.
    fn linger(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.recv_timeout;
        let fin_seq = self.receiver.ack_number().wrapping_sub(1);
        loop {
            match self.recv_segment(deadline)? {
                Incoming::Segment(seg, _) if seg.header.has(flags::FIN) && seg.header.seq == fin_seq => {
                    self.send_ack()?;
                    log::debug!("[microtcp] ← retransmitted FIN; → ACK again");
                }
                Incoming::Segment(..) | Incoming::Discarded => {}
                Incoming::Timeout => return Ok(()),
            }
        }
    }

    /// Peer-initiated close: acknowledge the FIN at `peer_fin_seq`, send our
    /// own FIN|ACK and wait for its acknowledgement.
    ///
    /// `peer_ack` is the ACK number the peer's FIN carried.  Anything we
    /// sent beyond it is abandoned and our FIN takes that sequence number.
    /// The caller has already checked that the FIN sits at the frontier.
    pub(crate) fn passive_close(&mut self, peer_fin_seq: u32, peer_ack: u32) -> Result<()> {
        let peer = self.peer()?;
        self.receiver.on_fin(peer_fin_seq);
        self.sender.queue.clear();
        self.sender.next_seq = peer_ack;
        self.send_ack()?;
        self.state = ConnectionState::ClosingByPeer;
        log::debug!("[microtcp] ← FIN|ACK seq={peer_fin_seq}; state {}", self.state);

        let fin_seq = peer_ack;
        let own_fin = Segment::new(
            fin_seq,
            self.receiver.ack_number(),
            flags::FIN | flags::ACK,
            self.receiver.window_size(),
            vec![],
        );
        let bits = own_fin.encode();
        let mut timer = self.retry_timer();

        loop {
            self.transmit(&bits, peer)?;
            log::debug!("[microtcp] → FIN|ACK seq={fin_seq}");

            let deadline = Instant::now() + timer.timeout();
            loop {
                let seg = match self.recv_segment(deadline)? {
                    Incoming::Segment(seg, _) => seg,
                    Incoming::Discarded => continue,
                    Incoming::Timeout => break,
                };
                let h = seg.header;
                if h.has(flags::FIN) && h.seq == peer_fin_seq {
                    // Our ACK of their FIN was lost.
                    self.send_ack()?;
                } else if h.has(flags::ACK) && h.ack == fin_seq.wrapping_add(1) {
                    self.sender.next_seq = fin_seq.wrapping_add(1);
                    self.close();
                    return Ok(());
                }
            }

            if !timer.expire() {
                log::warn!("[microtcp] FIN not acknowledged after {} attempts", timer.attempts());
                return Err(ConnError::ShutdownFailed {
                    attempts: timer.attempts(),
                });
            }
            log::warn!("[microtcp] FIN timeout, retransmitting (attempt {})", timer.attempts());
        }
    }

    /// `true` if `seq` is a FIN this connection should act on now.
    pub(crate) fn fin_at_frontier(&self, seq: u32) -> bool {
        seq == self.receiver.ack_number()
    }

    /// Enter `CLOSED` and release buffers, queues and the peer address.
    fn close(&mut self) {
        self.receiver.release();
        self.sender.queue.clear();
        if let Some(peer) = self.peer.take() {
            log::info!("[microtcp] connection with {peer} closed ({})", self.stats);
        }
        self.state = ConnectionState::Closed;
    }

    // -----------------------------------------------------------------------
    // Segment I/O
    // -----------------------------------------------------------------------

    pub(crate) fn retry_timer(&self) -> RetryTimer {
        RetryTimer::new(
            self.config.recv_timeout,
            self.config.backoff,
            self.config.max_retries,
        )
    }

    pub(crate) fn peer(&self) -> Result<SocketAddr> {
        self.peer.ok_or(ConnError::NotEstablished(self.state))
    }

    fn transport(&mut self) -> Result<&mut T> {
        let state = self.state;
        self.transport
            .as_mut()
            .ok_or(ConnError::BadState { op: "transmit", state })
    }

    /// Put one bitstream on the wire.
    pub(crate) fn transmit(&mut self, bitstream: &[u8], peer: SocketAddr) -> Result<()> {
        self.transport()?.send_to(bitstream, peer)?;
        self.stats.record_sent(bitstream.len());
        Ok(())
    }

    /// Send a pure ACK for the current frontier and window.
    pub(crate) fn send_ack(&mut self) -> Result<()> {
        let peer = self.peer()?;
        let ack = Segment::new(
            self.sender.next_seq,
            self.receiver.ack_number(),
            flags::ACK,
            self.receiver.window_size(),
            vec![],
        );
        self.transmit(&ack.encode(), peer)?;
        log::debug!(
            "[microtcp] → ACK ack={} win={}",
            ack.header.ack,
            ack.header.window
        );
        Ok(())
    }

    /// Wait until `deadline` for one datagram and decode it.
    ///
    /// Undecodable datagrams are counted as lost; once a peer is recorded,
    /// datagrams from any other address are ignored.
    pub(crate) fn recv_segment(&mut self, deadline: Instant) -> Result<Incoming> {
        let wait = match deadline.checked_duration_since(Instant::now()) {
            Some(wait) if !wait.is_zero() => wait,
            _ => return Ok(Incoming::Timeout),
        };

        let state = self.state;
        let transport = self
            .transport
            .as_mut()
            .ok_or(ConnError::BadState { op: "recv", state })?;
        transport.set_recv_timeout(Some(wait))?;
        let (n, from) = match transport.recv_from(&mut self.scratch) {
            Ok(Some(received)) => received,
            Ok(None) => return Ok(Incoming::Timeout),
            Err(e) => return Err(ConnError::RecvFailed(e)),
        };

        if self.peer.is_some_and(|peer| peer != from) {
            log::debug!("[microtcp] ignoring {n}-byte datagram from stranger {from}");
            return Ok(Incoming::Discarded);
        }

        match Segment::decode(&self.scratch[..n]) {
            Ok(seg) => {
                self.stats.record_received(n);
                log::debug!(
                    "[microtcp] ← {} seq={} ack={} win={} len={}",
                    flags::describe(seg.header.control),
                    seg.header.seq,
                    seg.header.ack,
                    seg.header.window,
                    seg.payload.len()
                );
                Ok(Incoming::Segment(seg, from))
            }
            Err(e) => {
                self.stats.record_lost(n);
                log::debug!("[microtcp] dropping datagram from {from}: {e}");
                Ok(Incoming::Discarded)
            }
        }
    }
}

/// Random odd initial sequence number.
fn random_isn() -> u32 {
    rand::rng().random::<u32>() | 1
}
