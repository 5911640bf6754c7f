//! Tables command implementation.

use fixturedb_sqlite::ListenerClient;
use std::net::SocketAddr;

/// Runs the tables command.
pub fn run(addr: SocketAddr, unit: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = ListenerClient::connect(addr)?;
    let names = client.tables(unit)?;
    if names.is_empty() {
        println!("No tables in unit '{unit}'");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}
