//! Fault-injecting datagram transport for deterministic testing.
//!
//! Real networks drop, reorder, duplicate and corrupt packets.  To exercise
//! the reliability machinery without depending on actual network
//! conditions, [`Simulator`] wraps any [`Datagram`] transport and applies a
//! fault model to the traffic that passes through it:
//!
//! | Fault        | Random (outgoing only)  | Scripted (either direction)  |
//! |--------------|-------------------------|------------------------------|
//! | Loss         | `loss_rate`             | [`Fault::Drop`]              |
//! | Duplication  | `duplicate_rate`        | [`Fault::Duplicate`]         |
//! | Corruption   | `corrupt_rate`          | [`Fault::Corrupt`]           |
//! | Reordering   | `reorder_rate`          | n/a                          |
//!
//! Random faults draw from a seeded `StdRng`, so a failing test replays
//! exactly.  Scripted faults hit the next `count` datagrams of one
//! [`SegmentKind`], e.g. "drop the first SYN|ACK that arrives", which is how
//! the handshake and duplicate-delivery tests are built.
//!
//! A reordered datagram is held back and released right after the next
//! outgoing datagram (or at the next receive call, whichever comes first).

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::{peek_control, peek_data_len};
use crate::transport::Datagram;

/// Configuration for the random fault model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that an outgoing datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that an outgoing datagram is sent twice.
    pub duplicate_rate: f64,
    /// Probability that one byte of an outgoing datagram is flipped.
    pub corrupt_rate: f64,
    /// Probability that an outgoing datagram is overtaken by the next one.
    pub reorder_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    /// Only random loss, at `rate`.
    pub fn lossy(rate: f64, seed: u64) -> Self {
        Self {
            loss_rate: rate,
            seed,
            ..Self::default()
        }
    }
}

/// Traffic direction relative to the wrapped transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Which datagrams a scripted fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Payload-less segments whose control field is exactly this mask.
    Control(u16),
    /// Any segment carrying payload.
    Data,
}

impl SegmentKind {
    fn matches(self, datagram: &[u8]) -> bool {
        let (Some(control), Some(data_len)) = (peek_control(datagram), peek_data_len(datagram))
        else {
            return false;
        };
        match self {
            Self::Control(mask) => data_len == 0 && control == mask,
            Self::Data => data_len > 0,
        }
    }
}

/// What to do to a matching datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Drop,
    Duplicate,
    Corrupt,
}

#[derive(Debug, Clone)]
struct ScriptedFault {
    direction: Direction,
    kind: SegmentKind,
    fault: Fault,
    remaining: u32,
}

/// Counters of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounts {
    pub dropped: u64,
    pub duplicated: u64,
    pub corrupted: u64,
    pub reordered: u64,
}

/// A fault-injecting wrapper around a datagram transport.
pub struct Simulator<T: Datagram> {
    inner: T,
    config: SimulatorConfig,
    rng: StdRng,
    script: Vec<ScriptedFault>,
    /// Outgoing datagram held back to be overtaken.
    held: Option<(Vec<u8>, SocketAddr)>,
    /// Extra copies of incoming datagrams, delivered before reading again.
    replay: VecDeque<(Vec<u8>, SocketAddr)>,
    counts: FaultCounts,
}

impl<T: Datagram> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        Self {
            inner,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            script: Vec::new(),
            held: None,
            replay: VecDeque::new(),
            counts: FaultCounts::default(),
        }
    }

    /// Apply `fault` to the next `count` datagrams of `kind` travelling in
    /// `direction`.  Scripted faults take precedence over random ones.
    pub fn script(&mut self, direction: Direction, kind: SegmentKind, fault: Fault, count: u32) {
        self.script.push(ScriptedFault {
            direction,
            kind,
            fault,
            remaining: count,
        });
    }

    /// Replace the random fault model, reseeding the RNG.
    pub fn set_config(&mut self, config: SimulatorConfig) {
        self.rng = StdRng::seed_from_u64(config.seed);
        self.config = config;
    }

    pub fn counts(&self) -> FaultCounts {
        self.counts
    }

    /// Consume one use of the first scripted fault matching `datagram`.
    fn scripted(&mut self, direction: Direction, datagram: &[u8]) -> Option<Fault> {
        let entry = self
            .script
            .iter_mut()
            .find(|s| s.remaining > 0 && s.direction == direction && s.kind.matches(datagram))?;
        entry.remaining -= 1;
        let fault = entry.fault;
        self.script.retain(|s| s.remaining > 0);
        Some(fault)
    }

    fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.rng.random_bool(p.min(1.0))
    }

    fn corrupt(&mut self, datagram: &mut [u8]) {
        if datagram.is_empty() {
            return;
        }
        let idx = self.rng.random_range(0..datagram.len());
        let bit = self.rng.random_range(0..8u32);
        datagram[idx] ^= 1 << bit;
        self.counts.corrupted += 1;
    }

    fn release_held(&mut self) -> io::Result<()> {
        if let Some((datagram, peer)) = self.held.take() {
            self.inner.send_to(&datagram, peer)?;
        }
        Ok(())
    }
}

impl<T: Datagram> Datagram for Simulator<T> {
    fn bind(addr: SocketAddr) -> io::Result<Self> {
        Ok(Self::new(T::bind(addr)?, SimulatorConfig::default()))
    }

    fn send_to(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        let fault = match self.scripted(Direction::Outgoing, buf) {
            Some(fault) => Some(fault),
            None if self.chance(self.config.loss_rate) => Some(Fault::Drop),
            None if self.chance(self.config.corrupt_rate) => Some(Fault::Corrupt),
            None if self.chance(self.config.duplicate_rate) => Some(Fault::Duplicate),
            None => None,
        };

        match fault {
            Some(Fault::Drop) => {
                self.counts.dropped += 1;
                log::trace!("[sim] dropped outgoing {} bytes", buf.len());
            }
            Some(Fault::Corrupt) => {
                let mut copy = buf.to_vec();
                self.corrupt(&mut copy);
                self.inner.send_to(&copy, peer)?;
                log::trace!("[sim] corrupted outgoing {} bytes", buf.len());
            }
            Some(Fault::Duplicate) => {
                self.inner.send_to(buf, peer)?;
                self.inner.send_to(buf, peer)?;
                self.counts.duplicated += 1;
                log::trace!("[sim] duplicated outgoing {} bytes", buf.len());
            }
            None if self.held.is_none() && self.chance(self.config.reorder_rate) => {
                self.held = Some((buf.to_vec(), peer));
                self.counts.reordered += 1;
                log::trace!("[sim] holding back {} bytes", buf.len());
                return Ok(buf.len());
            }
            None => {
                self.inner.send_to(buf, peer)?;
            }
        }
        self.release_held()?;
        Ok(buf.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        self.release_held()?;
        loop {
            let (n, from) = match self.replay.pop_front() {
                Some((datagram, from)) => {
                    let n = datagram.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram[..n]);
                    return Ok(Some((n, from)));
                }
                None => match self.inner.recv_from(buf)? {
                    Some(received) => received,
                    None => return Ok(None),
                },
            };

            match self.scripted(Direction::Incoming, &buf[..n]) {
                Some(Fault::Drop) => {
                    self.counts.dropped += 1;
                    log::trace!("[sim] dropped incoming {n} bytes");
                    continue;
                }
                Some(Fault::Corrupt) => self.corrupt(&mut buf[..n]),
                Some(Fault::Duplicate) => {
                    self.replay.push_back((buf[..n].to_vec(), from));
                    self.counts.duplicated += 1;
                }
                None => {}
            }
            return Ok(Some((n, from)));
        }
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_recv_timeout(timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
