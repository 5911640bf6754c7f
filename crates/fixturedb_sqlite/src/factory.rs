//! SQLite provider and factory.

use crate::config::{self, ListenerConfig, SqliteSettings};
use crate::handle::{open_connection, SqliteHandle};
use crate::schema;
use crate::server::SqliteListener;
use fixturedb_provider::{
    DatabaseListener, EntityType, PersistenceFactory, PersistenceProvider, ProviderError,
    ProviderResult, Properties,
};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Persistence provider backed by embedded SQLite databases.
///
/// Units and their entity types are declared up front:
///
/// ```rust
/// use fixturedb_provider::{Column, EntityType};
/// use fixturedb_sqlite::SqliteProvider;
///
/// struct Invoice;
///
/// let provider = SqliteProvider::new().unit(
///     "billing",
///     [EntityType::entity::<Invoice>().column(Column::id("id"))],
/// );
/// assert_eq!(provider.unit_names(), vec!["billing"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SqliteProvider {
    units: BTreeMap<String, Vec<EntityType>>,
    listener: Option<ListenerConfig>,
}

impl SqliteProvider {
    /// Creates a provider with no units.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a unit and the types it manages.
    #[must_use]
    pub fn unit(
        mut self,
        name: impl Into<String>,
        types: impl IntoIterator<Item = EntityType>,
    ) -> Self {
        self.units.insert(name.into(), types.into_iter().collect());
        self
    }

    /// Overrides the listener configuration; the port is still taken from
    /// [`create_listener`](PersistenceProvider::create_listener).
    #[must_use]
    pub fn with_listener_config(mut self, config: ListenerConfig) -> Self {
        self.listener = Some(config);
        self
    }

    /// Declared unit names.
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.keys().map(String::as_str).collect()
    }
}

impl PersistenceProvider for SqliteProvider {
    type Factory = SqliteFactory;

    fn create_factory(&self, unit: &str, properties: &Properties) -> ProviderResult<SqliteFactory> {
        let types = self
            .units
            .get(unit)
            .ok_or_else(|| ProviderError::UnknownUnit(unit.to_string()))?;
        let settings = SqliteSettings::from_properties(unit, properties)?;
        SqliteFactory::open(unit, settings, types.clone())
    }

    fn create_listener(
        &self,
        port: u16,
        properties: &Properties,
    ) -> ProviderResult<Box<dyn DatabaseListener>> {
        let config = match &self.listener {
            Some(config) => {
                let mut addr = config.bind_addr;
                addr.set_port(port);
                config.clone().with_bind_addr(addr)
            }
            None => ListenerConfig::new(port),
        };
        Ok(Box::new(SqliteListener::new(config, properties.clone())))
    }
}

/// Factory for one SQLite persistence unit.
///
/// Holds a keeper connection for its whole lifetime so a named in-memory
/// database survives while no handle is open.
pub struct SqliteFactory {
    unit: String,
    settings: SqliteSettings,
    types: Vec<EntityType>,
    keeper: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFactory")
            .field("unit", &self.unit)
            .field("url", &self.settings.url)
            .field("types", &self.types.len())
            .finish()
    }
}

impl SqliteFactory {
    /// Opens the unit's database and prepares its schema.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the database cannot be opened or the
    /// schema cannot be generated.
    pub fn open(unit: &str, settings: SqliteSettings, types: Vec<EntityType>) -> ProviderResult<Self> {
        let construction = |e: ProviderError| ProviderError::construction(unit, e.to_string());

        let keeper = open_connection(&settings).map_err(construction)?;
        schema::generate(&keeper, &types, settings.ddl, settings.foreign_keys)
            .map_err(construction)?;

        info!(unit, url = %settings.url, types = types.len(), "persistence factory ready");
        Ok(Self {
            unit: unit.to_string(),
            settings,
            types,
            keeper: Mutex::new(keeper),
        })
    }

    /// Resolved settings.
    pub fn settings(&self) -> &SqliteSettings {
        &self.settings
    }
}

impl PersistenceFactory for SqliteFactory {
    type Handle = SqliteHandle;

    fn unit_name(&self) -> &str {
        &self.unit
    }

    fn create_handle(&self, properties: &Properties) -> ProviderResult<SqliteHandle> {
        if let Some(mode) = properties.get(config::TRANSACTION_MODE) {
            if !mode.trim().eq_ignore_ascii_case("local") {
                return Err(ProviderError::construction(
                    &self.unit,
                    format!("transaction mode '{mode}' is not supported, use local"),
                ));
            }
        }
        SqliteHandle::open(&self.unit, &self.settings)
    }

    fn managed_types(&self) -> &[EntityType] {
        &self.types
    }

    fn reset_storage(&self) -> ProviderResult<()> {
        debug!(unit = %self.unit, "resetting storage");
        let keeper = self.keeper.lock();
        schema::drop_tables(&keeper, &self.types, self.settings.foreign_keys)?;
        schema::create_tables(&keeper, &self.types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixturedb_provider::{Column, DeleteOutcome, PersistenceHandle};

    struct Author;
    struct Book;

    fn provider() -> SqliteProvider {
        SqliteProvider::new().unit(
            "library",
            [
                EntityType::entity::<Author>().column(Column::id("id")),
                EntityType::entity::<Book>()
                    .column(Column::id("id"))
                    .column(Column::integer("author_id").references("Author")),
            ],
        )
    }

    fn factory(unit: &str) -> SqliteFactory {
        let props = Properties::new().with(config::URL, format!("file:{unit}?mode=memory&cache=shared"));
        provider().create_factory("library", &props).unwrap()
    }

    #[test]
    fn unknown_units_are_rejected() {
        let err = provider().create_factory("nope", &Properties::new()).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownUnit(name) if name == "nope"));
    }

    #[test]
    fn data_survives_closed_handles() {
        let factory = factory("factory-keeper");
        let mut h = factory.create_handle(&Properties::new()).unwrap();
        h.execute("INSERT INTO \"Author\" (id) VALUES (1)").unwrap();
        h.close().unwrap();

        let h = factory.create_handle(&Properties::new()).unwrap();
        assert_eq!(h.count("Author").unwrap(), 1);
    }

    #[test]
    fn handles_see_foreign_key_conflicts() {
        let factory = factory("factory-fk");
        let mut h = factory.create_handle(&Properties::new()).unwrap();
        h.execute("INSERT INTO \"Author\" (id) VALUES (1)").unwrap();
        h.execute("INSERT INTO \"Book\" (id, author_id) VALUES (1, 1)").unwrap();

        h.begin().unwrap();
        assert!(matches!(h.delete_all("Author").unwrap(), DeleteOutcome::Conflict(_)));
        h.rollback().unwrap();
    }

    #[test]
    fn only_local_transaction_mode() {
        let factory = factory("factory-mode");
        let props = Properties::new().with(config::TRANSACTION_MODE, "managed");
        assert!(factory.create_handle(&props).is_err());
        let props = Properties::new().with(config::TRANSACTION_MODE, "local");
        assert!(factory.create_handle(&props).is_ok());
    }

    #[test]
    fn reset_storage_empties_tables_despite_foreign_keys() {
        let factory = factory("factory-reset");
        let h = factory.create_handle(&Properties::new()).unwrap();
        h.execute("INSERT INTO \"Author\" (id) VALUES (1)").unwrap();
        h.execute("INSERT INTO \"Book\" (id, author_id) VALUES (1, 1)").unwrap();
        drop(h);

        factory.reset_storage().unwrap();

        let h = factory.create_handle(&Properties::new()).unwrap();
        assert_eq!(h.count("Author").unwrap(), 0);
        assert_eq!(h.count("Book").unwrap(), 0);
    }

    #[test]
    fn file_databases_via_url_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("{unit}.db");
        let props = Properties::new().with(config::URL, path.to_string_lossy());

        let factory = provider().create_factory("library", &props).unwrap();
        assert!(dir.path().join("library.db").exists());
        assert_eq!(factory.managed_types().len(), 2);
    }
}
