//! Per-connection traffic counters.

use std::fmt;

/// Running counters kept by every connection.
///
/// "Lost" counts datagrams the engine had to discard or resend: corrupted
/// arrivals, duplicates of already delivered data, and retransmissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_lost: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub bytes_lost: u64,
}

impl Stats {
    pub(crate) fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub(crate) fn record_lost(&mut self, bytes: usize) {
        self.packets_lost += 1;
        self.bytes_lost += bytes as u64;
    }

    /// Fraction of sent packets that were lost, in `[0, 1]`.
    pub fn loss_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            (self.packets_lost as f64 / self.packets_sent as f64).min(1.0)
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent {} pkts / {} B, received {} pkts / {} B, lost {} pkts / {} B",
            self.packets_sent,
            self.bytes_sent,
            self.packets_received,
            self.bytes_received,
            self.packets_lost,
            self.bytes_lost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let mut s = Stats::default();
        s.record_sent(100);
        s.record_sent(50);
        s.record_received(32);
        s.record_lost(50);
        assert_eq!(s.packets_sent, 2);
        assert_eq!(s.bytes_sent, 150);
        assert_eq!(s.bytes_received, 32);
        assert_eq!(s.loss_ratio(), 0.5);
    }

    #[test]
    fn display_is_one_line() {
        let s = Stats::default();
        assert!(!s.to_string().contains('\n'));
    }
}
