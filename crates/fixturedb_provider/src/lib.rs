//! # fixturedb Provider
//!
//! The contract between the fixture manager and a persistence provider.
//!
//! The fixture manager never talks to a database directly. It only needs to:
//!
//! - build a [`PersistenceFactory`] for a persistence unit
//! - open [`PersistenceHandle`]s and drive begin/commit/rollback/close
//! - enumerate managed types through the factory's metamodel
//! - run a delete-all against a table and learn whether it hit a constraint
//! - optionally start and stop a [`DatabaseListener`]
//!
//! ## Example
//!
//! ```rust
//! use fixturedb_provider::{Column, EntityType, Properties};
//!
//! struct Book;
//!
//! let book = EntityType::entity::<Book>()
//!     .column(Column::id("id"))
//!     .column(Column::text("title").required());
//! assert_eq!(book.storage_name().as_deref(), Some("Book"));
//!
//! let props = Properties::parse("persistence.ddl-generation=create-tables");
//! assert_eq!(props.get("persistence.ddl-generation"), Some("create-tables"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod metamodel;
mod properties;
mod provider;

pub use error::{ProviderError, ProviderResult};
pub use metamodel::{Column, ColumnKind, EntityType, TypeKind};
pub use properties::{Properties, TRANSACTION_MODE};
pub use provider::{
    DatabaseListener, DeleteOutcome, HandleId, PersistenceFactory, PersistenceHandle,
    PersistenceProvider,
};
