//! Receiver-side reorder queue.
//!
//! Payloads that arrive ahead of the cumulative ACK frontier wait here until
//! the missing predecessor shows up.  Entries are kept strictly ascending by
//! sequence number (wrap-around aware), so draining is a pop-front loop that
//! stops at the first gap.
//!
//! Retransmitted duplicates are rejected on insert rather than merged.

use std::collections::VecDeque;

use crate::seq::seq_lt;

/// One buffered payload (header already stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderEntry {
    pub seq: u32,
    pub payload: Vec<u8>,
}

impl ReorderEntry {
    /// Sequence number just past this payload.
    pub fn end(&self) -> u32 {
        self.seq.wrapping_add(self.payload.len() as u32)
    }
}

/// Out-of-order payload store.
#[derive(Debug, Default)]
pub struct ReorderQueue {
    entries: VecDeque<ReorderEntry>,
    /// Sum of payload lengths held.
    bytes_kept: usize,
}

impl ReorderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `payload` at its sorted position.
    ///
    /// Returns `false` (and stores nothing) when an entry with the same
    /// sequence number is already queued.
    pub fn insert(&mut self, seq: u32, payload: Vec<u8>) -> bool {
        let idx = self.entries.partition_point(|e| seq_lt(e.seq, seq));
        if self.entries.get(idx).is_some_and(|e| e.seq == seq) {
            return false;
        }
        self.bytes_kept += payload.len();
        self.entries.insert(idx, ReorderEntry { seq, payload });
        true
    }

    /// Pop the head entry if it starts exactly at `frontier`.
    pub fn pop_ready(&mut self, frontier: u32) -> Option<ReorderEntry> {
        if self.entries.front()?.seq != frontier {
            return None;
        }
        let entry = self.entries.pop_front()?;
        self.bytes_kept -= entry.payload.len();
        Some(entry)
    }

    /// Drain every contiguous entry starting at `*frontier`, advancing it by
    /// each payload's length.  Stops at the first gap.
    pub fn drain_contiguous(&mut self, frontier: &mut u32) -> Vec<ReorderEntry> {
        let mut ready = Vec::new();
        while let Some(entry) = self.pop_ready(*frontier) {
            *frontier = entry.end();
            ready.push(entry);
        }
        ready
    }

    /// Discard entries that lie entirely behind `frontier`.
    ///
    /// Returns how many were dropped.
    pub fn discard_before(&mut self, frontier: u32) -> usize {
        let mut dropped = 0;
        while let Some(front) = self.entries.front() {
            if !seq_lt(front.seq, frontier) {
                break;
            }
            if let Some(entry) = self.entries.pop_front() {
                self.bytes_kept -= entry.payload.len();
                dropped += 1;
            }
        }
        dropped
    }

    /// Lowest buffered sequence number.
    pub fn head_seq(&self) -> Option<u32> {
        self.entries.front().map(|e| e.seq)
    }

    pub fn bytes_kept(&self) -> usize {
        self.bytes_kept
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes_kept = 0;
    }
}
