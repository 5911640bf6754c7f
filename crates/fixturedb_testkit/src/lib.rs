//! # fixturedb Testkit
//!
//! Test utilities for fixturedb.
//!
//! This crate provides:
//! - Sample entities for SQLite-backed tests
//! - A scripted in-process provider with foreign key conflicts and call
//!   recording
//! - Property-based generators for random foreign key graphs
//! - Fixture and property-file helpers
//!
//! ## Usage
//!
//! ```rust
//! use fixturedb_testkit::prelude::*;
//!
//! let unit = unique_unit("library");
//! let fixture = fixture(library_provider(&unit))?;
//!
//! fixture.run(|scope| {
//!     let session = scope.session(&unit)?;
//!     let mut author = Author::new("Le Guin");
//!     session.lock()?.persist(&mut author)?;
//!     Ok(())
//! })?;
//! # Ok::<(), fixturedb_core::FixtureError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod entities;
pub mod fixtures;
pub mod generators;
pub mod scripted;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::entities::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scripted::*;
}

pub use entities::*;
pub use fixtures::*;
pub use generators::*;
pub use scripted::*;
