//! Execute command implementation.

use fixturedb_sqlite::ListenerClient;
use std::net::SocketAddr;

/// Runs the execute command.
pub fn run(addr: SocketAddr, unit: &str, sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = ListenerClient::connect(addr)?;
    let changed = client.execute(unit, sql)?;
    println!("{changed} row(s) changed");
    Ok(())
}
