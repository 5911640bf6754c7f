//! # fixturedb SQLite
//!
//! Persistence provider backed by embedded SQLite, plus an optional TCP
//! listener that exposes the in-memory databases to other processes.
//!
//! Each persistence unit maps to one database. By default that is a named
//! shared in-memory database (`file:{unit}?mode=memory&cache=shared`) kept
//! alive by the factory for as long as the factory exists, so data written
//! through one handle is visible to every other handle of the same unit.
//!
//! ## Example
//!
//! ```rust
//! use fixturedb_provider::{
//!     Column, EntityType, PersistenceFactory, PersistenceHandle, PersistenceProvider, Properties,
//! };
//! use fixturedb_sqlite::{Entity, SqliteProvider};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Note {
//!     id: Option<i64>,
//!     body: String,
//! }
//!
//! impl Entity for Note {
//!     fn entity_type() -> EntityType {
//!         EntityType::entity::<Self>()
//!             .column(Column::id("id"))
//!             .column(Column::text("body"))
//!     }
//! }
//!
//! let provider = SqliteProvider::new().unit("doc-notes", [Note::entity_type()]);
//! let factory = provider.create_factory("doc-notes", &Properties::new())?;
//! let mut handle = factory.create_handle(&Properties::new())?;
//!
//! handle.begin()?;
//! let mut note = Note { id: None, body: "hello".into() };
//! handle.persist(&mut note)?;
//! handle.commit()?;
//!
//! assert_eq!(note.id, Some(1));
//! assert_eq!(handle.count("Note")?, 1);
//! handle.close()?;
//! # Ok::<(), fixturedb_provider::ProviderError>(())
//! ```
//!
//! ## Listener protocol
//!
//! See [`protocol`] for the line-delimited JSON messages understood by
//! [`SqliteListener`] and sent by [`ListenerClient`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
pub mod config;
mod entity;
mod error;
mod factory;
mod handle;
mod handler;
pub mod protocol;
mod schema;
mod server;

pub use client::ListenerClient;
pub use config::{DdlGeneration, ListenerConfig, SqliteSettings};
pub use entity::Entity;
pub use factory::{SqliteFactory, SqliteProvider};
pub use handle::SqliteHandle;
pub use handler::RequestHandler;
pub use protocol::{QueryRows, Request, Response};
pub use server::SqliteListener;
