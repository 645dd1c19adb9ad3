//! Data transfer on an established [`Connection`]: `send` and `recv`.
//!
//! # Send path
//!
//! ```text
//!  send(buf)
//!    ├─ fill: while outstanding + header + chunk <= min(cwnd, peer_window)
//!    │         → DATA seq=.. len=..   (queued as an unacked bitstream)
//!    └─ drain: wait for segments until the deadline
//!         ├─ ACK matching a queued entry  → retire prefix, reset timer
//!         ├─ 3rd duplicate ACK            → resend oldest entry
//!         ├─ FIN|ACK                      → passive close, PeerClosed
//!         └─ timeout                      → go-back-N: resend whole queue
//! ```
//!
//! # Receive path
//!
//! Resident bytes are served first.  Otherwise segments are read until one
//! makes data deliverable: payloads go through the [`crate::receiver`]
//! engine and every one of them is answered with a cumulative ACK, so a
//! duplicate or out-of-order arrival is re-ACKed at the current frontier.

use std::net::SocketAddr;
use std::time::Instant;

use crate::connection::{Connection, Incoming};
use crate::error::{ConnError, Result};
use crate::packet::{flags, HEADER_LEN};
use crate::receiver::Delivery;
use crate::sender::AckOutcome;
use crate::state::ConnectionState;
use crate::transport::Datagram;

impl<T: Datagram> Connection<T> {
    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Reliably transmit `buf`, returning once every byte is acknowledged.
    ///
    /// A failure after part of `buf` was acknowledged is reported as
    /// [`ConnError::SendIncomplete`]; the unacknowledged remainder is
    /// discarded and the next `send` starts right after the acknowledged
    /// prefix.
    pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.state.is_established() {
            return Err(ConnError::NotEstablished(self.state));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let start = self.sender.send_base;
        match self.send_all(buf, start) {
            Ok(()) => Ok(buf.len()),
            Err(e @ ConnError::PeerClosed { .. }) => Err(e),
            Err(e) => {
                let acknowledged = self.sender.send_base.wrapping_sub(start) as usize;
                let dropped = self.sender.rollback();
                log::warn!(
                    "[microtcp] send failed after {acknowledged} acknowledged bytes, \
                     discarding {dropped} in flight: {e}"
                );
                if acknowledged == 0 {
                    Err(e)
                } else {
                    Err(ConnError::SendIncomplete {
                        acknowledged,
                        source: Box::new(e),
                    })
                }
            }
        }
    }

    fn send_all(&mut self, buf: &[u8], start: u32) -> Result<()> {
        let peer = self.peer()?;
        let mut offset = 0;
        let mut timer = self.retry_timer();
        let mut deadline = Instant::now() + timer.timeout();

        while offset < buf.len() || self.sender.has_unacked() {
            // Fill the window.
            while let Some(len) = self.sender.admissible_chunk(buf.len() - offset) {
                let idle = !self.sender.has_unacked();
                let seg = self.sender.build_data_segment(
                    buf[offset..offset + len].to_vec(),
                    self.receiver.ack_number(),
                    self.receiver.window_size(),
                );
                let bits = seg.encode();
                self.transmit(&bits, peer)?;
                self.sender.record_sent(bits, len);
                offset += len;
                log::debug!(
                    "[microtcp] → DATA seq={} len={} outstanding={} cwnd={} peer_win={}",
                    seg.header.seq,
                    len,
                    self.sender.queue.outstanding_bytes(),
                    self.sender.congestion.cwnd(),
                    self.sender.peer_window
                );
                if idle {
                    deadline = Instant::now() + timer.timeout();
                }
            }

            // Drain ACKs.
            let seg = match self.recv_segment(deadline)? {
                Incoming::Segment(seg, _) => seg,
                Incoming::Discarded => continue,
                Incoming::Timeout => {
                    if !timer.expire() {
                        log::warn!(
                            "[microtcp] {} segments still unacknowledged after {} retransmissions",
                            self.sender.queue.len(),
                            timer.attempts()
                        );
                        return Err(ConnError::MaxRetriesExceeded {
                            attempts: timer.attempts(),
                        });
                    }
                    self.sender.on_timeout();
                    let resent = self.retransmit(peer, usize::MAX)?;
                    let oldest_tx = self.sender.queue.front().map_or(0, |e| e.tx_count);
                    log::warn!(
                        "[microtcp] timeout, resent {resent} segments from seq={} \
                         (attempt {}, oldest sent {oldest_tx}x, cwnd={})",
                        self.sender.send_base,
                        timer.attempts(),
                        self.sender.congestion.cwnd()
                    );
                    deadline = Instant::now() + timer.timeout();
                    continue;
                }
            };

            let h = seg.header;
            if h.is_exactly(flags::SYN | flags::ACK) {
                // Our final handshake ACK was lost.
                self.send_ack()?;
                continue;
            }
            if !seg.payload.is_empty() {
                self.absorb_data(h.seq, seg.payload)?;
            }
            if h.has(flags::ACK) {
                match self.sender.on_ack(h.ack, h.window) {
                    AckOutcome::Advanced(retired) => {
                        log::debug!(
                            "[microtcp] ← ACK ack={} retired {} seg / {} B",
                            h.ack,
                            retired.segments,
                            retired.payload_bytes
                        );
                        timer.reset();
                        deadline = Instant::now() + timer.timeout();
                    }
                    AckOutcome::Duplicate { count } => {
                        log::debug!("[microtcp] ← duplicate ACK ack={} (#{count})", h.ack);
                    }
                    AckOutcome::FastRetransmit => {
                        self.retransmit(peer, 1)?;
                        log::warn!(
                            "[microtcp] third duplicate ACK, fast retransmit seq={}",
                            self.sender.send_base
                        );
                    }
                    AckOutcome::Mismatch => {
                        log::warn!(
                            "[microtcp] AckNumberMismatch: ack={} matches no unacknowledged segment",
                            h.ack
                        );
                    }
                    AckOutcome::Idle => {}
                }
            }
            if h.has(flags::FIN) && self.fin_at_frontier(h.seq) {
                let acknowledged = self.sender.send_base.wrapping_sub(start) as usize;
                self.passive_close(h.seq, h.ack)?;
                return Err(ConnError::PeerClosed { acknowledged });
            }
        }
        Ok(())
    }

    /// Resend the oldest `count` queued bitstreams (all of them for
    /// `usize::MAX`).  Returns how many were sent.
    fn retransmit(&mut self, peer: SocketAddr, count: usize) -> Result<usize> {
        let state = self.state;
        let transport = self
            .transport
            .as_mut()
            .ok_or(ConnError::BadState { op: "retransmit", state })?;
        let mut resent = 0;
        for entry in self.sender.queue.iter().take(count) {
            transport.send_to(&entry.bitstream, peer)?;
            self.stats.record_sent(entry.wire_len());
            self.stats.record_lost(entry.wire_len());
            resent += 1;
        }
        self.sender.queue.mark_retransmitted(resent);
        Ok(resent)
    }

    // -----------------------------------------------------------------------
    // Receive
    // -----------------------------------------------------------------------

    /// Read in-order bytes into `buf`.
    ///
    /// Returns `Ok(0)` once the peer has closed the connection.  Gives up
    /// with [`ConnError::TimedOut`] after `idle_timeouts` consecutive empty
    /// waits; the connection is unaffected and `recv` may be called again.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(ConnError::InvalidArgument("receive buffer is empty"));
        }
        match self.state {
            ConnectionState::Established => {}
            ConnectionState::Closed => return Ok(0),
            state => return Err(ConnError::NotEstablished(state)),
        }
        if self.receiver.buffered() > 0 {
            return Ok(self.receiver.read(buf));
        }

        // Only valid segments from the peer restart the idle clock; garbage
        // and strangers cannot keep the wait alive.
        let mut idle = 0;
        let mut deadline = Instant::now() + self.config.recv_timeout;
        loop {
            let seg = match self.recv_segment(deadline)? {
                Incoming::Segment(seg, _) => seg,
                Incoming::Discarded => continue,
                Incoming::Timeout => {
                    idle += 1;
                    if idle >= self.config.idle_timeouts {
                        return Err(ConnError::TimedOut);
                    }
                    deadline = Instant::now() + self.config.recv_timeout;
                    continue;
                }
            };
            idle = 0;
            deadline = Instant::now() + self.config.recv_timeout;

            let h = seg.header;
            if h.is_exactly(flags::SYN | flags::ACK) {
                self.send_ack()?;
                continue;
            }
            if h.has(flags::ACK) {
                if let AckOutcome::Mismatch = self.sender.on_ack(h.ack, h.window) {
                    log::warn!("[microtcp] AckNumberMismatch: ack={}", h.ack);
                }
            }
            if !seg.payload.is_empty() {
                self.absorb_data(h.seq, seg.payload)?;
            }
            if h.has(flags::FIN) && self.fin_at_frontier(h.seq) {
                self.passive_close(h.seq, h.ack)?;
                return Ok(0);
            }
            if self.receiver.buffered() > 0 {
                return Ok(self.receiver.read(buf));
            }
        }
    }

    /// Run one payload through the receive engine and acknowledge it.
    pub(crate) fn absorb_data(&mut self, seq: u32, payload: Vec<u8>) -> Result<Delivery> {
        let len = payload.len();
        let outcome = self.receiver.on_segment(seq, payload);
        match outcome {
            Delivery::Delivered(n) => {
                log::debug!("[microtcp] ← DATA seq={seq} len={len}: {n} bytes now readable");
            }
            Delivery::Buffered => {
                log::debug!(
                    "[microtcp] ← DATA seq={seq} len={len}: out of order, expecting {}",
                    self.receiver.ack_number()
                );
            }
            Delivery::Duplicate => {
                self.stats.record_lost(HEADER_LEN + len);
                log::debug!("[microtcp] ← DATA seq={seq} len={len}: duplicate");
            }
            Delivery::Overflow => {
                self.stats.record_lost(HEADER_LEN + len);
                log::warn!(
                    "[microtcp] receive buffer full ({} buffered), dropped seq={seq} len={len}",
                    self.receiver.buffered()
                );
            }
        }
        self.send_ack()?;
        Ok(outcome)
    }
}
