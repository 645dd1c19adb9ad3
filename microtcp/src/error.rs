//! Error type shared by every public operation.
//!
//! Corrupted, duplicate and unrelated datagrams are handled inside the
//! engine's retry loops and never surface here.  What does surface is what
//! the caller must act on: wrong state, exhausted retry budgets, transport
//! failures, and the orderly or partial end of a transfer.

use std::io;

use crate::state::ConnectionState;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConnError>;

/// Errors returned by [`crate::connection::Connection`] operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// An argument was unusable (e.g. an empty receive buffer).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Only IPv4 addresses are supported.
    #[error("unsupported address family for {0}")]
    UnsupportedAddressFamily(std::net::SocketAddr),

    /// Data transfer attempted outside `ESTABLISHED`.
    #[error("socket is not established (state {0})")]
    NotEstablished(ConnectionState),

    /// Operation not legal in the current state.
    #[error("operation `{op}` not allowed in state {state}")]
    BadState {
        op: &'static str,
        state: ConnectionState,
    },

    /// Only the side that called `connect` may start a teardown.
    #[error("shutdown must be initiated by the connecting side")]
    ShutdownNotPermitted,

    /// The three-way handshake did not complete within the retry budget.
    #[error("handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    /// The FIN exchange did not complete within the retry budget.
    #[error("shutdown failed after {attempts} attempts")]
    ShutdownFailed { attempts: u32 },

    /// Outstanding data was never acknowledged.
    #[error("data not acknowledged after {attempts} retransmissions")]
    MaxRetriesExceeded { attempts: u32 },

    /// Nothing arrived within the idle budget; the connection is unchanged.
    #[error("timed out waiting for the peer")]
    TimedOut,

    /// The peer closed the connection while we were sending.
    #[error("peer closed the connection after {acknowledged} bytes were acknowledged")]
    PeerClosed { acknowledged: usize },

    /// A multi-segment send failed part-way.
    #[error("send incomplete: {acknowledged} bytes acknowledged before failure")]
    SendIncomplete {
        acknowledged: usize,
        #[source]
        source: Box<ConnError>,
    },

    /// The datagram transport failed on receive (not a timeout).
    #[error("receive failed: {0}")]
    RecvFailed(#[source] io::Error),

    /// The datagram transport failed (bind, send, timeout configuration).
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConnError {
    /// Bytes acknowledged before this error, for errors that carry them.
    pub fn acknowledged(&self) -> usize {
        match self {
            Self::PeerClosed { acknowledged } | Self::SendIncomplete { acknowledged, .. } => {
                *acknowledged
            }
            _ => 0,
        }
    }
}
