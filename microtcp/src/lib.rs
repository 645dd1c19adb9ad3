//! `microtcp`: a TCP-like reliable byte stream implemented over UDP.
//!
//! # Architecture
//!
//! ```text
//!  application  send(&[u8]) / recv(&mut [u8])
//!       │
//!  ┌────▼────────────────────────────────────────────┐
//!  │                  Connection                     │
//!  │  state machine · handshake · teardown · stats   │
//!  │                                                 │
//!  │  ┌──────────────────┐    ┌───────────────────┐  │
//!  │  │      Sender      │    │     Receiver      │  │
//!  │  │  UnackedQueue    │    │  ReorderQueue     │  │
//!  │  │  Congestion      │    │  app buffer       │  │
//!  │  └──────────────────┘    └───────────────────┘  │
//!  └────┬────────────────────────────────────────────┘
//!       │ bitstreams (32-byte header + payload, CRC-32)
//!  ┌────▼──────────────┐
//!  │  impl Datagram    │  UdpSocket, or Simulator<UdpSocket> in tests
//!  └───────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (encode / decode, CRC-32)
//! - [`connection`]: lifecycle (bind, handshake, teardown, segment I/O)
//! - [`transfer`]: `send` / `recv` on an established connection
//! - [`sender`]: window admission and ACK processing
//! - [`receiver`]: reassembly and advertised window
//! - [`unacked`]: queue of transmitted, unacknowledged bitstreams
//! - [`reorder`]: out-of-order payload store
//! - [`congestion`]: cwnd / ssthresh evolution
//! - [`timer`]: bounded retries and backoff
//! - [`state`]: finite-state-machine types
//! - [`seq`]: wrap-around sequence comparisons
//! - [`transport`]: the datagram abstraction
//! - [`simulator`]: seeded lossy/reordering transport for testing
//! - [`config`], [`error`], [`stats`]
//!
//! # Example
//!
//! ```no_run
//! use microtcp::Connection;
//!
//! # fn main() -> microtcp::Result<()> {
//! let mut conn = Connection::open();
//! conn.connect("127.0.0.1:9000".parse().unwrap())?;
//! conn.send(b"hello")?;
//! conn.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod congestion;
pub mod connection;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod reorder;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod state;
pub mod stats;
pub mod timer;
pub mod transfer;
pub mod transport;
pub mod unacked;

pub use config::Config;
pub use connection::Connection;
pub use error::{ConnError, Result};
pub use state::{ConnectionState, Role};
pub use stats::Stats;
pub use transport::Datagram;
