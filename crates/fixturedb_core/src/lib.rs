//! # fixturedb Core
//!
//! Test-fixture lifecycle manager for database-backed integration tests.
//!
//! This crate provides:
//! - [`Registry`]: one cached persistence factory per unit, built on first use
//! - [`PersistenceFixture`]: wraps a test body, tracks its [`Session`]s,
//!   detects transactions left open, closes sessions and clears tables
//! - [`clear_tables`]: empties every managed table without a declared
//!   deletion order, retrying tables blocked by foreign keys
//! - [`FixtureConfig`]: layered property sources and the optional listener
//!   port
//!
//! ## Usage
//!
//! ```rust
//! use fixturedb_core::{FixtureConfig, PersistenceFixture};
//! use fixturedb_provider::{Column, EntityType};
//! use fixturedb_sqlite::SqliteProvider;
//!
//! struct Account;
//!
//! let provider = SqliteProvider::new().unit(
//!     "doc-core",
//!     [EntityType::entity::<Account>().column(Column::id("id"))],
//! );
//! let fixture = PersistenceFixture::new(provider, FixtureConfig::new())?;
//!
//! let result = fixture.run(|scope| {
//!     let session = scope.session("doc-core")?;
//!     session.begin()?;
//!     session.lock()?.execute("INSERT INTO \"Account\" (id) VALUES (7)")?;
//!     // No commit: the fixture rolls back and reports the leak.
//!     Ok(())
//! });
//! assert!(result.unwrap_err().is_leaked_transaction());
//! # Ok::<(), fixturedb_core::FixtureError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod clearing;
mod config;
pub mod defaults;
mod error;
mod fixture;
mod registry;
mod session;

pub use clearing::{clear_tables, ClearPolicy, ClearReport};
pub use config::{read_port, FixtureConfig, ResolvedConfig, ResourceLoader};
pub use error::{BoxError, FixtureError, FixtureResult};
pub use fixture::{FixtureScope, PersistenceFixture};
pub use registry::{HandleOf, Registry};
pub use session::Session;
