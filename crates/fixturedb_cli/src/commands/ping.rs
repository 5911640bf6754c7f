//! Ping command implementation.

use fixturedb_sqlite::ListenerClient;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::debug;

/// Runs the ping command.
pub fn run(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let mut client = ListenerClient::connect(addr)?;
    client.ping()?;
    let elapsed = started.elapsed();
    debug!(%addr, ?elapsed, "pong");
    println!("pong from {addr} in {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    Ok(())
}
