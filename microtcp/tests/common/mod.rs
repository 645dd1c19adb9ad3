//! Shared helpers for the loopback integration tests.
//!
//! Every test runs two real endpoints on 127.0.0.1, the responder on a
//! background thread.  Timeouts are shortened so that loss recovery takes
//! milliseconds instead of seconds.

#![allow(dead_code)]

use std::net::{SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use microtcp::simulator::{Simulator, SimulatorConfig};
use microtcp::{Config, Connection, Datagram, Result};
use rand::Rng;

/// Default configuration with a 50 ms receive timeout.
pub fn test_config() -> Config {
    let mut config = Config::default().with_recv_timeout(Duration::from_millis(50));
    config.idle_timeouts = 100;
    config
}

/// Bind a UDP socket on an OS-chosen loopback port.
pub fn ephemeral() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").expect("bind loopback socket")
}

/// A listening UDP-backed connection and the address clients should use.
pub fn bind_server(config: Config) -> (Connection, SocketAddr) {
    let socket = ephemeral();
    let addr = socket.local_addr().expect("local addr");
    (Connection::from_transport(socket, config), addr)
}

/// Same as [`bind_server`] but behind a fault-injecting simulator.
pub fn bind_sim_server(
    config: Config,
    sim: SimulatorConfig,
) -> (Connection<Simulator<UdpSocket>>, SocketAddr) {
    let socket = ephemeral();
    let addr = socket.local_addr().expect("local addr");
    (
        Connection::from_transport(Simulator::new(socket, sim), config),
        addr,
    )
}

/// A client connection whose traffic passes through a simulator.
pub fn sim_client(config: Config, sim: SimulatorConfig) -> Connection<Simulator<UdpSocket>> {
    Connection::from_transport(Simulator::new(ephemeral(), sim), config)
}

/// Run `accept` on a background thread and hand the connection back.
pub fn spawn_accept<T>(mut server: Connection<T>) -> JoinHandle<(Connection<T>, Result<SocketAddr>)>
where
    T: Datagram + Send + 'static,
{
    thread::spawn(move || {
        let result = server.accept();
        (server, result)
    })
}

/// Read until the peer closes, returning everything received.
pub fn recv_to_end<T: Datagram>(conn: &mut Connection<T>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match conn.recv(&mut buf)? {
            0 => return Ok(out),
            n => out.extend_from_slice(&buf[..n]),
        }
    }
}

/// Read exactly `len` bytes.
pub fn recv_exact<T: Datagram>(conn: &mut Connection<T>, len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 4096];
    while out.len() < len {
        let want = (len - out.len()).min(buf.len());
        let n = conn.recv(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

/// `len` random bytes.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random()).collect()
}
