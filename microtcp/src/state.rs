//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a [`crate::connection::Connection`] can
//! occupy.  The transitions themselves live in [`crate::connection`] (handshake
//! and teardown) and [`crate::transfer`] (peer-initiated teardown observed
//! while sending or receiving); the guards they share live here.
//!
//! ```text
//!  READY ──bind──▶ LISTEN ──accept / connect──▶ ESTABLISHED
//!    │                                            │       │
//!    └──────────connect (ephemeral bind)──────────┘       │
//!                                                         │
//!               shutdown (initiator)  ┌───────────────────┤ FIN|ACK received
//!                                     ▼                   ▼ (responder)
//!                             CLOSING_BY_HOST      CLOSING_BY_PEER
//!                                     │                   │
//!                                     └──────▶ CLOSED ◀───┘
//!
//!  INVALID: terminal, reached only when construction fails
//!           (e.g. an unsupported address family).
//! ```

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created; no local address yet.
    #[default]
    Ready,
    /// Bound to a local address; ready to `accept` or `connect`.
    Listen,
    /// Handshake complete; data transfer in progress.
    Established,
    /// We sent FIN and it was acknowledged; waiting for the peer's FIN.
    ClosingByHost,
    /// The peer sent FIN; we acknowledged it and are sending our own.
    ClosingByPeer,
    /// Teardown finished; buffers released.
    Closed,
    /// Construction failed; the connection can never be used.
    Invalid,
}

impl ConnectionState {
    /// `true` once the handshake has completed and teardown has not begun.
    pub fn is_established(self) -> bool {
        self == Self::Established
    }

    /// `true` when a handshake may be attempted from this state.
    pub fn can_open(self) -> bool {
        matches!(self, Self::Ready | Self::Listen)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ready => "READY",
            Self::Listen => "LISTEN",
            Self::Established => "ESTABLISHED",
            Self::ClosingByHost => "CLOSING_BY_HOST",
            Self::ClosingByPeer => "CLOSING_BY_PEER",
            Self::Closed => "CLOSED",
            Self::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// Which side of the handshake this connection played.
///
/// Only the [`Role::Initiator`] may start a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Performed `connect` (active open).
    Initiator,
    /// Performed `accept` (passive open).
    Responder,
}
