//! Unacknowledged-segment queue.
//!
//! [`UnackedQueue`] holds every bitstream that has been transmitted but not
//! yet covered by a cumulative ACK, in transmission order.  Each entry knows
//! the acknowledgment number that retires it:
//!
//! - data segments: `seq + payload_len` (the peer's next expected byte);
//! - payload-less control segments (SYN, FIN): `seq + 1`.
//!
//! An incoming ACK whose number matches some entry retires that entry and
//! every entry before it (prefix drop).  An ACK that matches nothing leaves
//! the queue untouched; the caller decides whether it is a duplicate.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// UnackedEntry
// ---------------------------------------------------------------------------

/// A transmitted bitstream awaiting acknowledgement.
#[derive(Debug, Clone)]
pub struct UnackedEntry {
    /// The exact bytes that went on the wire (header + payload).
    pub bitstream: Vec<u8>,
    /// Sequence number carried in the segment header.
    pub seq: u32,
    /// Payload bytes carried (0 for control segments).
    pub payload_len: usize,
    /// ACK number that retires this entry.
    pub required_ack: u32,
    /// Total number of times this bitstream has been transmitted.
    pub tx_count: u32,
}

impl UnackedEntry {
    /// Size this entry contributes to the outstanding byte total.
    pub fn wire_len(&self) -> usize {
        self.bitstream.len()
    }
}

/// Acknowledgment number that retires a segment starting at `seq`.
pub fn required_ack(seq: u32, payload_len: usize) -> u32 {
    if payload_len == 0 {
        seq.wrapping_add(1)
    } else {
        seq.wrapping_add(payload_len as u32)
    }
}

/// Result of a successful cumulative retirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retired {
    /// Number of entries removed from the front of the queue.
    pub segments: usize,
    /// Payload bytes those entries carried.
    pub payload_bytes: usize,
    /// Wire bytes (header + payload) those entries carried.
    pub wire_bytes: usize,
}

// ---------------------------------------------------------------------------
// UnackedQueue
// ---------------------------------------------------------------------------

/// FIFO of in-flight bitstreams plus the running outstanding-byte total.
#[derive(Debug, Default)]
pub struct UnackedQueue {
    entries: VecDeque<UnackedEntry>,
    /// Sum of `wire_len()` over all entries.
    outstanding: usize,
}

impl UnackedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly transmitted bitstream.
    pub fn push(&mut self, bitstream: Vec<u8>, seq: u32, payload_len: usize) {
        self.outstanding += bitstream.len();
        self.entries.push_back(UnackedEntry {
            required_ack: required_ack(seq, payload_len),
            bitstream,
            seq,
            payload_len,
            tx_count: 1,
        });
    }

    /// Retire every entry up to and including the one whose required ACK is
    /// `ack_num`.
    ///
    /// Returns `None` (queue unchanged) when no entry matches.
    pub fn acknowledge(&mut self, ack_num: u32) -> Option<Retired> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.required_ack == ack_num)?;

        let mut retired = Retired {
            segments: 0,
            payload_bytes: 0,
            wire_bytes: 0,
        };
        for entry in self.entries.drain(..=idx) {
            retired.segments += 1;
            retired.payload_bytes += entry.payload_len;
            retired.wire_bytes += entry.wire_len();
        }
        debug_assert!(
            retired.wire_bytes <= self.outstanding,
            "outstanding byte count would go negative"
        );
        self.outstanding -= retired.wire_bytes;
        Some(retired)
    }

    /// Bytes (header + payload) sent but not yet acknowledged.
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest in-flight entry.
    pub fn front(&self) -> Option<&UnackedEntry> {
        self.entries.front()
    }

    /// Iterate over in-flight entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &UnackedEntry> {
        self.entries.iter()
    }

    /// Bump the transmission count of the oldest `count` entries after they
    /// were resent.
    pub fn mark_retransmitted(&mut self, count: usize) {
        for entry in self.entries.iter_mut().take(count) {
            entry.tx_count += 1;
        }
    }

    /// Drop everything.  Returns the entries that were still in flight.
    pub fn clear(&mut self) -> Vec<UnackedEntry> {
        self.outstanding = 0;
        self.entries.drain(..).collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
