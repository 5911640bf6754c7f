//! Benchmark utilities.

use fixturedb_provider::{PersistenceFactory, PersistenceProvider, Properties, TRANSACTION_MODE};
use fixturedb_sqlite::{SqliteFactory, SqliteProvider};
use fixturedb_testkit::{unique_unit, ScriptedFactory, ScriptedProvider, TableGraph};

/// Properties for handles opened outside a fixture.
pub fn local_handle() -> Properties {
    Properties::new().with(TRANSACTION_MODE, "local")
}

/// A fresh scripted factory for `graph` with its seed rows in place.
///
/// # Panics
///
/// Panics if the factory cannot be built.
pub fn scripted_factory(graph: &TableGraph) -> ScriptedFactory {
    let provider = ScriptedProvider::new().unit("bench", graph.scripted_unit());
    let factory = provider
        .create_factory("bench", &Properties::new())
        .expect("scripted factory");
    for (table, rows) in graph.seed_rows() {
        factory.seed(&table, rows);
    }
    factory
}

/// A fresh SQLite factory for `graph`, under its own unit, with every
/// table populated.
///
/// # Panics
///
/// Panics if the database cannot be created or seeded.
pub fn sqlite_factory(graph: &TableGraph) -> SqliteFactory {
    let unit = unique_unit("bench");
    let provider = SqliteProvider::new().unit(&unit, graph.entity_types());
    let factory = provider
        .create_factory(&unit, &Properties::new())
        .expect("sqlite factory");
    let handle = factory.create_handle(&local_handle()).expect("handle");
    for statement in graph.insert_statements() {
        handle.execute(&statement).expect("seed insert");
    }
    factory
}
