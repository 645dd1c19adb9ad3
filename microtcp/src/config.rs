//! Tunable protocol parameters.
//!
//! Every constant the engine depends on is collected in [`Config`] so that
//! the binary can map command-line flags onto it and tests can shrink the
//! timeouts.  [`Config::default`] reproduces the classic microTCP numbers.

use std::time::Duration;

use crate::packet::HEADER_LEN;
use crate::timer::Backoff;

/// Maximum segment size on the wire (header included).
pub const DEFAULT_MSS: usize = 1400;
/// Receive buffer capacity, also the largest window we advertise.
pub const DEFAULT_RECV_BUFFER_LEN: usize = 8192;
/// How long one blocking receive waits for a datagram.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(200);
/// Attempts per handshake, teardown or retransmission phase.
pub const DEFAULT_MAX_RETRIES: u32 = 10;
/// Consecutive empty receive timeouts before `recv` reports `TimedOut`.
pub const DEFAULT_IDLE_TIMEOUTS: u32 = 25;

/// Protocol configuration for one connection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum segment size including the 32-byte header.
    pub mss: usize,
    /// Capacity of the receive buffer in bytes.
    pub recv_buffer_len: usize,
    /// Base receive timeout for each blocking wait.
    pub recv_timeout: Duration,
    /// Bound on retransmissions for every retry loop.
    pub max_retries: u32,
    /// How the receive timeout grows between attempts.
    pub backoff: Backoff,
    /// Consecutive empty timeouts tolerated by `recv` before it gives up.
    pub idle_timeouts: u32,
    /// Congestion window at connection start, in bytes.
    pub initial_cwnd: usize,
    /// Slow-start threshold at connection start, in bytes.
    pub initial_ssthresh: usize,
    /// Grow/shrink cwnd on ACKs and losses.  When off, cwnd stays fixed.
    pub congestion_control: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: DEFAULT_MSS,
            recv_buffer_len: DEFAULT_RECV_BUFFER_LEN,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::Fixed,
            idle_timeouts: DEFAULT_IDLE_TIMEOUTS,
            initial_cwnd: 3 * DEFAULT_MSS,
            initial_ssthresh: DEFAULT_RECV_BUFFER_LEN,
            congestion_control: true,
        }
    }
}

impl Config {
    /// Largest payload one segment can carry.
    pub fn max_payload(&self) -> usize {
        self.mss.saturating_sub(HEADER_LEN).max(1)
    }

    /// Window we advertise when the receive buffer is empty.
    pub fn advertised_window(&self) -> u16 {
        self.recv_buffer_len.min(u16::MAX as usize) as u16
    }

    /// Same configuration with a different receive timeout.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Same configuration with a different MSS; cwnd follows the new MSS.
    pub fn with_mss(mut self, mss: usize) -> Self {
        self.mss = mss;
        self.initial_cwnd = 3 * mss;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_constants() {
        let c = Config::default();
        assert_eq!(c.max_payload(), 1368);
        assert_eq!(c.initial_cwnd, 4200);
        assert_eq!(c.initial_ssthresh, 8192);
        assert_eq!(c.advertised_window(), 8192);
        assert_eq!(c.recv_timeout, Duration::from_millis(200));
    }

    #[test]
    fn huge_buffer_is_clamped_in_the_header() {
        let c = Config {
            recv_buffer_len: 1 << 20,
            ..Config::default()
        };
        assert_eq!(c.advertised_window(), u16::MAX);
    }

    #[test]
    fn with_mss_rescales_cwnd() {
        let c = Config::default().with_mss(532);
        assert_eq!(c.max_payload(), 500);
        assert_eq!(c.initial_cwnd, 1596);
    }
}
