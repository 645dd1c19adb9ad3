//! Congestion window management.
//!
//! The sender may never have more than `min(cwnd, peer_window)` bytes
//! outstanding.  [`Congestion`] owns `cwnd` and `ssthresh` and reacts to
//! the three events the sender reports:
//!
//! - new data acknowledged: slow start below `ssthresh` (`cwnd += acked`),
//!   congestion avoidance above it (`cwnd += mss²/cwnd`, at least 1);
//! - retransmission timeout: `ssthresh = max(cwnd/2, mss)`, `cwnd = mss`;
//! - third duplicate ACK: `ssthresh = max(cwnd/2, mss)`,
//!   `cwnd = ssthresh + 3·mss` (fast retransmit / recovery entry).
//!
//! With `enabled == false` the window stays at its initial value, which is
//! the plain stop/start admission behaviour.

#[derive(Debug, Clone)]
pub struct Congestion {
    cwnd: usize,
    ssthresh: usize,
    mss: usize,
    enabled: bool,
}

impl Congestion {
    pub fn new(initial_cwnd: usize, initial_ssthresh: usize, mss: usize, enabled: bool) -> Self {
        Self {
            cwnd: initial_cwnd.max(mss),
            ssthresh: initial_ssthresh.max(mss),
            mss,
            enabled,
        }
    }

    pub fn cwnd(&self) -> usize {
        self.cwnd
    }

    pub fn ssthresh(&self) -> usize {
        self.ssthresh
    }

    /// `true` while the window grows exponentially.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// New data covering `acked_bytes` was cumulatively acknowledged.
    pub fn on_ack(&mut self, acked_bytes: usize) {
        if !self.enabled {
            return;
        }
        if self.in_slow_start() {
            self.cwnd = self.cwnd.saturating_add(acked_bytes);
        } else {
            let inc = (self.mss.saturating_mul(self.mss) / self.cwnd).max(1);
            self.cwnd = self.cwnd.saturating_add(inc);
        }
    }

    /// The retransmission timer expired.
    pub fn on_timeout(&mut self) {
        if !self.enabled {
            return;
        }
        self.ssthresh = (self.cwnd / 2).max(self.mss);
        self.cwnd = self.mss;
    }

    /// The third duplicate ACK arrived.
    pub fn on_triple_duplicate(&mut self) {
        if !self.enabled {
            return;
        }
        self.ssthresh = (self.cwnd / 2).max(self.mss);
        self.cwnd = self.ssthresh.saturating_add(3 * self.mss);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: usize = 1400;

    #[test]
    fn slow_start_grows_by_acked_bytes() {
        let mut c = Congestion::new(3 * MSS, 8192, MSS, true);
        c.on_ack(1400);
        assert_eq!(c.cwnd(), 5600);
        assert!(c.in_slow_start());
    }

    #[test]
    fn congestion_avoidance_grows_slowly() {
        let mut c = Congestion::new(10_000, 8192, MSS, true);
        assert!(!c.in_slow_start());
        c.on_ack(1400);
        assert_eq!(c.cwnd(), 10_000 + MSS * MSS / 10_000);
    }

    #[test]
    fn timeout_collapses_window() {
        let mut c = Congestion::new(8000, 8192, MSS, true);
        c.on_timeout();
        assert_eq!(c.ssthresh(), 4000);
        assert_eq!(c.cwnd(), MSS);
    }

    #[test]
    fn ssthresh_never_drops_below_mss() {
        let mut c = Congestion::new(MSS, 8192, MSS, true);
        c.on_timeout();
        assert_eq!(c.ssthresh(), MSS);
    }

    #[test]
    fn triple_duplicate_halves_then_inflates() {
        let mut c = Congestion::new(8000, 8192, MSS, true);
        c.on_triple_duplicate();
        assert_eq!(c.ssthresh(), 4000);
        assert_eq!(c.cwnd(), 4000 + 3 * MSS);
    }

    #[test]
    fn disabled_window_is_fixed() {
        let mut c = Congestion::new(4200, 8192, MSS, false);
        c.on_ack(1400);
        c.on_timeout();
        c.on_triple_duplicate();
        assert_eq!(c.cwnd(), 4200);
    }
}
