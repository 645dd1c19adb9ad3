//! Bounded retry timing.
//!
//! Every blocking exchange in the engine (SYN, SYN|ACK, FIN, data
//! retransmission) waits on the datagram transport's receive timeout and
//! retries a bounded number of times.  This module provides:
//! - [`Backoff`]: how the per-attempt timeout evolves between retries.
//! - [`RetryTimer`]: the attempt counter plus the current timeout; the
//!   connection asks it for the next wait and learns when the budget is gone.
//!
//! There is no RTT estimation: timeouts are either fixed or doubled on each
//! consecutive expiry, capped at `max`.

use std::time::Duration;

/// Growth policy for the per-attempt receive timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Every attempt waits the base timeout.
    Fixed,
    /// Each expiry doubles the timeout, capped at `max`.
    Exponential { max: Duration },
}

/// Attempt counter for one retry loop.
#[derive(Debug, Clone)]
pub struct RetryTimer {
    base: Duration,
    current: Duration,
    backoff: Backoff,
    attempts: u32,
    max_attempts: u32,
}

impl RetryTimer {
    /// A timer allowing `max_attempts` expiries of `base` under `backoff`.
    pub fn new(base: Duration, backoff: Backoff, max_attempts: u32) -> Self {
        Self {
            base,
            current: base,
            backoff,
            attempts: 0,
            max_attempts,
        }
    }

    /// Timeout to use for the next blocking wait.
    pub fn timeout(&self) -> Duration {
        self.current
    }

    /// Number of expiries recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one expiry.
    ///
    /// Returns `false` once the retry budget is exhausted; the caller must
    /// stop retrying and report failure.
    pub fn expire(&mut self) -> bool {
        self.attempts += 1;
        if let Backoff::Exponential { max } = self.backoff {
            self.current = (self.current * 2).min(max);
        }
        self.attempts < self.max_attempts
    }

    /// Forget earlier expiries after progress was made (an ACK advanced the
    /// window).  The timeout returns to its base value.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current = self.base;
    }
}
