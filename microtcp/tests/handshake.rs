//! Integration tests for the 3-way handshake.
//!
//! Each test binds real `UdpSocket`s on loopback, runs the server half on a
//! background thread, and checks what both sides agree on once the
//! handshake is done.

mod common;

use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use microtcp::packet::flags;
use microtcp::simulator::{Direction, Fault, SegmentKind, SimulatorConfig};
use microtcp::{ConnError, Connection, ConnectionState, Role};

use common::{bind_server, ephemeral, sim_client, spawn_accept, test_config};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Both sides should reach `Established` after a clean handshake on loopback.
#[test]
fn handshake_both_sides_reach_established() {
    let (server, server_addr) = bind_server(test_config());
    let server_task = spawn_accept(server);

    let mut client: Connection = Connection::with_config(test_config());
    client.connect(server_addr).expect("client connect failed");

    let (server, accepted) = server_task.join().expect("server thread panicked");
    let peer = accepted.expect("server accept failed");

    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(server.state(), ConnectionState::Established);
    assert_eq!(client.role(), Some(Role::Initiator));
    assert_eq!(server.role(), Some(Role::Responder));
    assert_eq!(peer.port(), client.local_addr().unwrap().port());
    assert_eq!(client.peer_addr(), Some(server_addr));
}

/// Each side's next sequence number must equal the other side's frontier.
#[test]
fn handshake_sequence_numbers_agree() {
    let (server, server_addr) = bind_server(test_config());
    let server_task = spawn_accept(server);

    let mut client: Connection = Connection::with_config(test_config());
    client.connect(server_addr).unwrap();
    let (server, accepted) = server_task.join().unwrap();
    accepted.unwrap();

    assert_eq!(client.send_seq(), server.recv_frontier());
    assert_eq!(server.send_seq(), client.recv_frontier());
    // Initial sequence numbers are odd, so the first data byte is even.
    assert_eq!(client.send_seq() % 2, 0);
    assert_eq!(server.send_seq() % 2, 0);
}

/// Both sides settle on the smaller of the two advertised windows.
#[test]
fn handshake_negotiates_minimum_window() {
    let mut small = test_config();
    small.recv_buffer_len = 4096;
    let (server, server_addr) = bind_server(small);
    let server_task = spawn_accept(server);

    let mut client: Connection = Connection::with_config(test_config());
    client.connect(server_addr).unwrap();
    let (server, accepted) = server_task.join().unwrap();
    accepted.unwrap();

    assert_eq!(client.negotiated_window(), 4096);
    assert_eq!(server.negotiated_window(), 4096);
    assert_eq!(client.peer_window(), 4096);
    assert_eq!(server.peer_window(), 8192);
}

/// Dropping the first SYN|ACK makes the client retransmit its SYN; the
/// server answers the duplicate SYN and the handshake completes.
#[test]
fn lost_syn_ack_is_recovered() {
    let (server, server_addr) = bind_server(test_config());
    let server_task = spawn_accept(server);

    let mut client = sim_client(test_config(), SimulatorConfig::default());
    client.transport_mut().unwrap().script(
        Direction::Incoming,
        SegmentKind::Control(flags::SYN | flags::ACK),
        Fault::Drop,
        1,
    );
    client.connect(server_addr).expect("connect after lost SYN|ACK");

    let (server, accepted) = server_task.join().unwrap();
    accepted.unwrap();

    assert_eq!(client.transport_mut().unwrap().counts().dropped, 1);
    assert!(client.stats().packets_sent >= 3, "SYN, SYN again, ACK");
    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(server.state(), ConnectionState::Established);

    // The retransmitted SYN|ACK carries the same numbers as the lost one.
    assert_eq!(client.send_seq(), server.recv_frontier());
    assert_eq!(server.send_seq(), client.recv_frontier());
}

/// A lost SYN is retransmitted too.
#[test]
fn lost_syn_is_recovered() {
    let (server, server_addr) = bind_server(test_config());
    let server_task = spawn_accept(server);

    let mut client = sim_client(test_config(), SimulatorConfig::default());
    client.transport_mut().unwrap().script(
        Direction::Outgoing,
        SegmentKind::Control(flags::SYN),
        Fault::Drop,
        1,
    );
    client.connect(server_addr).unwrap();

    let (server, accepted) = server_task.join().unwrap();
    accepted.unwrap();
    assert_eq!(server.state(), ConnectionState::Established);
}

/// When the final ACK is lost, the first data segment completes the
/// server's handshake and its payload is not lost.
#[test]
fn lost_final_ack_is_covered_by_first_data_segment() {
    let (server, server_addr) = bind_server(test_config());
    let server_task = std::thread::spawn(move || {
        let mut server = server;
        server.accept().unwrap();
        let data = common::recv_exact(&mut server, 5).unwrap();
        (server, data)
    });

    let mut client = sim_client(test_config(), SimulatorConfig::default());
    client.transport_mut().unwrap().script(
        Direction::Outgoing,
        SegmentKind::Control(flags::ACK),
        Fault::Drop,
        1,
    );
    client.connect(server_addr).unwrap();
    assert_eq!(client.send(b"hello").unwrap(), 5);

    let (server, data) = server_task.join().unwrap();
    assert_eq!(data, b"hello");
    assert_eq!(server.state(), ConnectionState::Established);
}

/// Nobody answers: the client gives up after `max_retries` SYNs and its
/// state is restored.
#[test]
fn connect_to_silent_peer_fails() {
    let silent = ephemeral();
    let silent_addr = silent.local_addr().unwrap();

    let mut config = test_config().with_recv_timeout(Duration::from_millis(20));
    config.max_retries = 3;
    let mut client: Connection = Connection::with_config(config);

    let err = client.connect(silent_addr).unwrap_err();
    assert!(
        matches!(err, ConnError::HandshakeFailed { attempts: 3 }),
        "unexpected error: {err}"
    );
    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(client.stats().packets_sent, 3);
    drop(silent);
}

#[test]
fn connect_rejects_ipv6_peer() {
    let mut client = Connection::open();
    let err = client
        .connect(SocketAddr::from((Ipv6Addr::LOCALHOST, 9000)))
        .unwrap_err();
    assert!(matches!(err, ConnError::UnsupportedAddressFamily(_)));
}

#[test]
fn connect_twice_is_rejected() {
    let (server, server_addr) = bind_server(test_config());
    let server_task = spawn_accept(server);

    let mut client: Connection = Connection::with_config(test_config());
    client.connect(server_addr).unwrap();
    server_task.join().unwrap().1.unwrap();

    let err = client.connect(server_addr).unwrap_err();
    assert!(matches!(err, ConnError::BadState { op: "connect", .. }));
}
