//! fixturedb CLI
//!
//! Talks to the TCP listener a fixture starts around each test run, so the
//! databases of a paused or running test can be inspected from outside.
//!
//! # Commands
//!
//! - `ping` - Check the listener is up
//! - `tables` - List the tables of a persistence unit
//! - `query` - Run a SELECT against a unit
//! - `execute` - Run a changing statement against a unit

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// fixturedb listener client.
#[derive(Parser)]
#[command(name = "fixturedb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listener address
    #[arg(global = true, short, long, default_value = "127.0.0.1:9092")]
    addr: SocketAddr,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the listener is up
    Ping,

    /// List the tables of a persistence unit
    Tables {
        /// Persistence unit name
        #[arg(short, long)]
        unit: String,
    },

    /// Run a query and print the rows
    Query {
        /// Persistence unit name
        #[arg(short, long)]
        unit: String,

        /// SQL to run
        sql: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a statement and print the changed row count
    Execute {
        /// Persistence unit name
        #[arg(short, long)]
        unit: String,

        /// SQL to run
        sql: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ping => commands::ping::run(cli.addr)?,
        Commands::Tables { unit } => commands::tables::run(cli.addr, &unit)?,
        Commands::Query { unit, sql, format } => {
            commands::query::run(cli.addr, &unit, &sql, &format)?;
        }
        Commands::Execute { unit, sql } => commands::execute::run(cli.addr, &unit, &sql)?,
    }

    Ok(())
}
