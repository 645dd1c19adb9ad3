//! Send-side state: sequence numbers, window admission, ACK processing.
//!
//! [`Sender`] decides *how much* may be sent and keeps the
//! [`UnackedQueue`] of transmitted bitstreams.  It does **not** touch the
//! socket; [`crate::transfer`] calls these methods and owns the actual
//! send/receive loop.
//!
//! # Sequence-number layout
//!
//! ```text
//!  send_base          next_seq
//!      │                  │
//!  ────┼──────────────────┼──────────────────▶ seq space
//!      │ <── in flight ──▶│ <── admissible while
//!                 outstanding + header + chunk <= min(cwnd, peer_window)
//! ```

use crate::config::Config;
use crate::congestion::Congestion;
use crate::packet::{flags, Segment, HEADER_LEN};
use crate::unacked::{Retired, UnackedQueue};

/// Duplicate ACKs that trigger a fast retransmit.
const DUP_ACK_THRESHOLD: u32 = 3;

/// What an incoming ACK number meant to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Retired one or more queued segments.
    Advanced(Retired),
    /// Repeated the current `send_base` while data is in flight.
    Duplicate { count: u32 },
    /// The duplicate that crosses the fast-retransmit threshold.
    FastRetransmit,
    /// Matches no queued segment and is not a duplicate.
    Mismatch,
    /// Nothing is in flight; only the window was updated.
    Idle,
}

/// Send-side state for one connection.
#[derive(Debug)]
pub struct Sender {
    /// Sequence number of the oldest unacknowledged byte.
    pub send_base: u32,
    /// Sequence number for the next new payload byte.
    pub next_seq: u32,
    /// Window most recently advertised by the peer.
    pub peer_window: usize,
    /// Transmitted, not yet acknowledged bitstreams.
    pub queue: UnackedQueue,
    pub congestion: Congestion,
    max_payload: usize,
    dup_acks: u32,
}

impl Sender {
    /// Create a sender whose first data byte carries `seq_start`.
    pub fn new(seq_start: u32, peer_window: usize, config: &Config) -> Self {
        Self {
            send_base: seq_start,
            next_seq: seq_start,
            peer_window,
            queue: UnackedQueue::new(),
            congestion: Congestion::new(
                config.initial_cwnd,
                config.initial_ssthresh,
                config.mss,
                config.congestion_control,
            ),
            max_payload: config.max_payload(),
            dup_acks: 0,
        }
    }

    /// `min(cwnd, peer_window)`: the cap on outstanding bytes.
    pub fn effective_window(&self) -> usize {
        self.congestion.cwnd().min(self.peer_window)
    }

    /// `true` when at least one segment awaits acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Payload size of the next chunk that may be sent now, given
    /// `remaining` unsent bytes, or `None` if the window is full.
    ///
    /// Admitting the chunk never takes the outstanding wire bytes past
    /// `min(cwnd, peer_window)`.  With nothing in flight and no full chunk
    /// fitting, a chunk shrunk to the window (at least one byte) is allowed
    /// so that a small peer window cannot stall the transfer.
    pub fn admissible_chunk(&self, remaining: usize) -> Option<usize> {
        if remaining == 0 {
            return None;
        }
        let chunk = remaining.min(self.max_payload);
        let window = self.effective_window();
        // Outstanding bytes are wire bytes, so the header counts too.
        if self.queue.outstanding_bytes() + HEADER_LEN + chunk <= window {
            return Some(chunk);
        }
        if self.queue.is_empty() {
            let fit = window.saturating_sub(HEADER_LEN).clamp(1, chunk);
            return Some(fit);
        }
        None
    }

    /// Build a data segment carrying `payload` at `next_seq`.
    ///
    /// Call [`record_sent`](Self::record_sent) after transmitting it.
    pub fn build_data_segment(&self, payload: Vec<u8>, ack: u32, window: u16) -> Segment {
        Segment::new(self.next_seq, ack, flags::ACK, window, payload)
    }

    /// Queue a just-transmitted data bitstream and advance `next_seq`.
    pub fn record_sent(&mut self, bitstream: Vec<u8>, payload_len: usize) {
        self.queue.push(bitstream, self.next_seq, payload_len);
        self.next_seq = self.next_seq.wrapping_add(payload_len as u32);
    }

    /// Process the ACK number and window of an incoming ACK segment.
    pub fn on_ack(&mut self, ack_num: u32, window: u16) -> AckOutcome {
        self.peer_window = usize::from(window);

        if let Some(retired) = self.queue.acknowledge(ack_num) {
            self.send_base = ack_num;
            self.dup_acks = 0;
            self.congestion.on_ack(retired.payload_bytes);
            return AckOutcome::Advanced(retired);
        }
        if self.queue.is_empty() {
            return AckOutcome::Idle;
        }
        if ack_num == self.send_base {
            self.dup_acks += 1;
            if self.dup_acks == DUP_ACK_THRESHOLD {
                self.congestion.on_triple_duplicate();
                return AckOutcome::FastRetransmit;
            }
            return AckOutcome::Duplicate {
                count: self.dup_acks,
            };
        }
        AckOutcome::Mismatch
    }

    /// The retransmission timer expired.
    pub fn on_timeout(&mut self) {
        self.dup_acks = 0;
        self.congestion.on_timeout();
    }

    /// Abandon everything in flight and rewind `next_seq` to `send_base`.
    ///
    /// Returns the payload bytes that were dropped.
    pub fn rollback(&mut self) -> usize {
        let dropped: usize = self.queue.clear().iter().map(|e| e.payload_len).sum();
        self.next_seq = self.send_base;
        self.dup_acks = 0;
        dropped
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
