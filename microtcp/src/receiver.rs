//! Inbound reassembly and receive-window management.
//!
//! The [`Receiver`] owns everything that happens *after* a datagram has been
//! decoded into a [`crate::packet::Segment`] and *before* the application
//! reads contiguous bytes:
//! - rejecting payloads that lie entirely behind the cumulative frontier;
//! - threading out-of-order payloads through the [`ReorderQueue`];
//! - moving contiguous bytes into the fixed-capacity application buffer;
//! - computing the ACK number and advertised window for outbound segments.
//!
//! It never sends anything; [`crate::transfer`] builds the ACKs from
//! [`Receiver::ack_number`] and [`Receiver::window_size`].

use std::collections::VecDeque;

use crate::reorder::ReorderQueue;
use crate::seq::{seq_le, seq_lt};

/// What happened to one inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frontier advanced; this many bytes became readable.
    Delivered(usize),
    /// Stored ahead of a gap.
    Buffered,
    /// Every byte was already received.
    Duplicate,
    /// Dropped because the receive buffer cannot hold it.
    Overflow,
}

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    /// Next in-order sequence number expected from the peer (RCV.NXT).
    rcv_nxt: u32,
    reorder: ReorderQueue,
    /// Ordered bytes not yet read by the application.
    app_buffer: VecDeque<u8>,
    capacity: usize,
}

impl Receiver {
    /// A receiver expecting `rcv_nxt` next, holding at most `capacity` bytes.
    pub fn new(rcv_nxt: u32, capacity: usize) -> Self {
        Self {
            rcv_nxt,
            reorder: ReorderQueue::new(),
            app_buffer: VecDeque::new(),
            capacity,
        }
    }

    /// Accept one inbound payload that starts at `seq`.
    pub fn on_segment(&mut self, seq: u32, mut payload: Vec<u8>) -> Delivery {
        let end = seq.wrapping_add(payload.len() as u32);
        if payload.is_empty() || seq_le(end, self.rcv_nxt) {
            return Delivery::Duplicate;
        }

        // Overlaps the frontier: keep only the new suffix.
        let seq = if seq_lt(seq, self.rcv_nxt) {
            let stale = self.rcv_nxt.wrapping_sub(seq) as usize;
            payload.drain(..stale);
            self.rcv_nxt
        } else {
            seq
        };

        if payload.len() > self.free_space() {
            return Delivery::Overflow;
        }
        if !self.reorder.insert(seq, payload) {
            return Delivery::Duplicate;
        }

        let before = self.app_buffer.len();
        for entry in self.reorder.drain_contiguous(&mut self.rcv_nxt) {
            self.app_buffer.extend(entry.payload);
        }
        self.reorder.discard_before(self.rcv_nxt);

        match self.app_buffer.len() - before {
            0 => Delivery::Buffered,
            n => Delivery::Delivered(n),
        }
    }

    /// Consume a FIN that sits exactly at the frontier.
    ///
    /// Returns `false` (frontier unchanged) for a FIN anywhere else.
    pub fn on_fin(&mut self, seq: u32) -> bool {
        if seq != self.rcv_nxt {
            return false;
        }
        self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
        true
    }

    /// The cumulative ACK number to advertise (RCV.NXT).
    pub fn ack_number(&self) -> u32 {
        self.rcv_nxt
    }

    /// Free receive capacity, clamped to the 16-bit header field.
    pub fn window_size(&self) -> u16 {
        self.free_space().min(u16::MAX as usize) as u16
    }

    /// Copy up to `buf.len()` buffered bytes into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.app_buffer.len());
        for (dst, src) in buf.iter_mut().zip(self.app_buffer.drain(..n)) {
            *dst = src;
        }
        n
    }

    /// Ordered bytes waiting for the application.
    pub fn buffered(&self) -> usize {
        self.app_buffer.len()
    }

    /// Out-of-order bytes waiting for a gap to fill.
    pub fn reordered(&self) -> usize {
        self.reorder.bytes_kept()
    }

    /// Drop all buffered data and give the memory back.
    pub fn release(&mut self) {
        self.app_buffer = VecDeque::new();
        self.reorder.clear();
    }

    fn free_space(&self) -> usize {
        self.capacity
            .saturating_sub(self.app_buffer.len() + self.reorder.bytes_kept())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_segment_is_delivered() {
        let mut r = Receiver::new(100, 8192);
        assert_eq!(r.on_segment(100, b"hello".to_vec()), Delivery::Delivered(5));
        assert_eq!(r.ack_number(), 105);
        assert_eq!(r.window_size(), 8192 - 5);

        let mut buf = [0u8; 16];
        assert_eq!(r.read(&mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(r.window_size(), 8192);
    }

    #[test]
    fn duplicate_is_delivered_once() {
        let mut r = Receiver::new(0, 8192);
        assert_eq!(r.on_segment(0, b"abc".to_vec()), Delivery::Delivered(3));
        assert_eq!(r.on_segment(0, b"abc".to_vec()), Delivery::Duplicate);
        assert_eq!(r.buffered(), 3);
        assert_eq!(r.ack_number(), 3);
    }

    #[test]
    fn gap_is_filled_from_reorder_queue() {
        let mut r = Receiver::new(0, 8192);
        assert_eq!(r.on_segment(4, b"efgh".to_vec()), Delivery::Buffered);
        assert_eq!(r.ack_number(), 0);
        assert_eq!(r.reordered(), 4);
        assert_eq!(r.window_size(), 8188);

        assert_eq!(r.on_segment(0, b"abcd".to_vec()), Delivery::Delivered(8));
        assert_eq!(r.ack_number(), 8);
        assert_eq!(r.reordered(), 0);

        let mut buf = [0u8; 8];
        r.read(&mut buf);
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn buffered_duplicate_is_rejected() {
        let mut r = Receiver::new(0, 8192);
        assert_eq!(r.on_segment(10, vec![1; 5]), Delivery::Buffered);
        assert_eq!(r.on_segment(10, vec![1; 5]), Delivery::Duplicate);
        assert_eq!(r.reordered(), 5);
    }

    #[test]
    fn overlapping_segment_keeps_new_suffix() {
        let mut r = Receiver::new(0, 8192);
        r.on_segment(0, b"abc".to_vec());
        assert_eq!(r.on_segment(1, b"bcde".to_vec()), Delivery::Delivered(2));
        let mut buf = [0u8; 8];
        let n = r.read(&mut buf);
        assert_eq!(&buf[..n], b"abcde");
    }

    #[test]
    fn payload_larger_than_free_space_is_dropped() {
        let mut r = Receiver::new(0, 8);
        assert_eq!(r.on_segment(0, vec![0; 6]), Delivery::Delivered(6));
        assert_eq!(r.on_segment(6, vec![0; 6]), Delivery::Overflow);
        assert_eq!(r.ack_number(), 6);
        assert_eq!(r.window_size(), 2);
    }

    #[test]
    fn partial_reads_drain_in_order() {
        let mut r = Receiver::new(0, 8192);
        r.on_segment(0, b"0123456789".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(r.read(&mut buf), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(r.read(&mut buf), 4);
        assert_eq!(&buf, b"4567");
        assert_eq!(r.read(&mut buf), 2);
        assert_eq!(&buf[..2], b"89");
    }

    #[test]
    fn fin_only_at_frontier() {
        let mut r = Receiver::new(50, 8192);
        assert!(!r.on_fin(60));
        assert!(r.on_fin(50));
        assert_eq!(r.ack_number(), 51);
    }

    #[test]
    fn release_empties_everything() {
        let mut r = Receiver::new(0, 8192);
        r.on_segment(0, vec![1; 10]);
        r.on_segment(20, vec![1; 10]);
        r.release();
        assert_eq!(r.buffered(), 0);
        assert_eq!(r.reordered(), 0);
    }

    #[test]
    fn wraps_around_sequence_space() {
        let mut r = Receiver::new(u32::MAX - 1, 8192);
        assert_eq!(r.on_segment(u32::MAX - 1, vec![7; 4]), Delivery::Delivered(4));
        assert_eq!(r.ack_number(), 2);
        assert_eq!(r.on_segment(u32::MAX, vec![7; 2]), Delivery::Duplicate);
    }
}
