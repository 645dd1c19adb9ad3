//! Entry point for `microtcp`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing) and the file I/O around a
//! transfer.

use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use microtcp::timer::Backoff;
use microtcp::{Config, ConnError, Connection, Stats};

/// Reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection and write everything received to a file.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Where to store the received bytes.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Connect to a server, send a file, then shut down.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: SocketAddr,
        /// File to send.
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Protocol knobs shared by both modes.
#[derive(Args)]
struct Tuning {
    /// Maximum segment size, header included.
    #[arg(long, global = true, default_value_t = microtcp::config::DEFAULT_MSS)]
    mss: usize,
    /// Receive timeout per attempt, in milliseconds.
    #[arg(long, global = true, default_value_t = 200)]
    timeout_ms: u64,
    /// Retransmissions before giving up.
    #[arg(long, global = true, default_value_t = microtcp::config::DEFAULT_MAX_RETRIES)]
    retries: u32,
    /// Receive buffer size in bytes.
    #[arg(long, global = true, default_value_t = microtcp::config::DEFAULT_RECV_BUFFER_LEN)]
    buffer: usize,
    /// Double the timeout on each consecutive expiry, capped at this many
    /// milliseconds.  Without it every attempt waits `--timeout-ms`.
    #[arg(long, global = true)]
    backoff_max_ms: Option<u64>,
    /// Keep the congestion window fixed at its initial size.
    #[arg(long, global = true)]
    no_congestion_control: bool,
}

impl Tuning {
    fn config(&self) -> Config {
        let mut config = Config::default()
            .with_mss(self.mss)
            .with_recv_timeout(Duration::from_millis(self.timeout_ms));
        config.max_retries = self.retries;
        config.recv_buffer_len = self.buffer;
        config.initial_ssthresh = self.buffer;
        config.congestion_control = !self.no_congestion_control;
        if let Some(max) = self.backoff_max_ms {
            config.backoff = Backoff::Exponential {
                max: Duration::from_millis(max),
            };
        }
        config
    }
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.tuning.config();

    match cli.mode {
        Mode::Server { bind, output } => run_server(bind, &output, config),
        Mode::Client { server, file } => run_client(server, &file, config),
    }
}

fn run_server(bind: SocketAddr, output: &Path, config: Config) -> Result<()> {
    let mut conn: Connection = Connection::with_config(config);
    conn.bind(bind).with_context(|| format!("binding {bind}"))?;
    log::info!("Listening on {}", conn.local_addr()?);

    let peer = conn.accept().context("accepting a connection")?;
    log::info!("Accepted connection from {peer}");

    let mut out = fs::File::create(output)
        .with_context(|| format!("creating {}", output.display()))?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0usize;
    let started = Instant::now();

    loop {
        match conn.recv(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.write_all(&buf[..n])?;
                total += n;
            }
            Err(ConnError::TimedOut) => {
                log::info!("Still waiting for data from {peer}");
            }
            Err(e) => return Err(e).context("receiving"),
        }
    }
    out.flush()?;

    report("Received", total, started.elapsed(), conn.stats());
    Ok(())
}

fn run_client(server: SocketAddr, file: &Path, config: Config) -> Result<()> {
    let data = fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    let mut conn: Connection = Connection::with_config(config);
    conn.connect(server)
        .with_context(|| format!("connecting to {server}"))?;
    log::info!("Connected to {server} from {}", conn.local_addr()?);

    let started = Instant::now();
    let sent = match conn.send(&data) {
        Ok(n) => n,
        Err(e) => {
            log::error!(
                "{} of {} bytes acknowledged before the send failed",
                e.acknowledged(),
                data.len()
            );
            return Err(e).context("sending");
        }
    };
    let elapsed = started.elapsed();
    conn.shutdown().context("shutting down")?;

    report("Sent", sent, elapsed, conn.stats());
    Ok(())
}

fn report(verb: &str, bytes: usize, elapsed: Duration, stats: Stats) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let mbps = bytes as f64 * 8.0 / secs / 1_000_000.0;
    println!("{verb} {bytes} bytes in {secs:.3} s ({mbps:.2} Mbit/s)");
    println!("{stats}");
    println!("loss ratio: {:.2}%", stats.loss_ratio() * 100.0);
}
