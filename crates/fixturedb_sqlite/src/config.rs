//! Provider and listener configuration.

use fixturedb_provider::{ProviderError, ProviderResult, Properties};
use std::net::SocketAddr;
use std::time::Duration;

/// Connection URL; `{unit}` is replaced by the persistence unit name.
pub const URL: &str = "persistence.url";
/// Schema generation mode: `create-tables`, `drop-and-create` or `none`.
pub const DDL_GENERATION: &str = "persistence.ddl-generation";
/// Transaction type; only `RESOURCE_LOCAL` is supported.
pub const TRANSACTION_TYPE: &str = "persistence.transaction-type";
/// Per-handle transaction mode; only `local` is supported.
pub use fixturedb_provider::TRANSACTION_MODE;
/// `on`/`off`: enforce foreign keys on every connection.
pub const FOREIGN_KEYS: &str = "sqlite.foreign-keys";
/// Busy timeout in milliseconds.
pub const BUSY_TIMEOUT_MS: &str = "sqlite.busy-timeout-ms";
/// SQLite journal mode.
pub const JOURNAL_MODE: &str = "sqlite.journal-mode";

/// URL used when none is configured: a named, shared in-memory database.
pub const DEFAULT_URL_TEMPLATE: &str = "file:{unit}?mode=memory&cache=shared";

/// How the factory prepares tables when it is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlGeneration {
    /// Leave the schema alone.
    None,
    /// Create missing tables.
    CreateTables,
    /// Drop managed tables, then create them.
    DropAndCreate,
}

impl DdlGeneration {
    fn parse(unit: &str, value: &str) -> ProviderResult<Self> {
        match value.trim() {
            "none" => Ok(Self::None),
            "create-tables" => Ok(Self::CreateTables),
            "drop-and-create" | "drop-and-create-tables" => Ok(Self::DropAndCreate),
            other => Err(ProviderError::construction(
                unit,
                format!("unknown {DDL_GENERATION} value '{other}'"),
            )),
        }
    }
}

/// Resolved settings of one SQLite persistence unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteSettings {
    /// Connection URL with the unit substituted.
    pub url: String,
    /// Schema generation mode.
    pub ddl: DdlGeneration,
    /// Whether foreign keys are enforced.
    pub foreign_keys: bool,
    /// How long to wait on a busy database.
    pub busy_timeout: Duration,
    /// Journal mode applied to each connection.
    pub journal_mode: String,
}

impl SqliteSettings {
    /// Reads the settings for `unit`, falling back to defaults for absent keys.
    ///
    /// # Errors
    ///
    /// Returns a construction error for unsupported or malformed values.
    pub fn from_properties(unit: &str, props: &Properties) -> ProviderResult<Self> {
        if let Some(kind) = props.get(TRANSACTION_TYPE) {
            if !kind.trim().eq_ignore_ascii_case("RESOURCE_LOCAL") {
                return Err(ProviderError::construction(
                    unit,
                    format!("transaction type '{kind}' is not supported, use RESOURCE_LOCAL"),
                ));
            }
        }

        let url = props
            .get(URL)
            .unwrap_or(DEFAULT_URL_TEMPLATE)
            .replace("{unit}", unit);

        let ddl = match props.get(DDL_GENERATION) {
            Some(value) => DdlGeneration::parse(unit, value)?,
            None => DdlGeneration::CreateTables,
        };

        let foreign_keys = match props.get(FOREIGN_KEYS).map(str::trim) {
            None => true,
            Some(v) if v.eq_ignore_ascii_case("on") || v.eq_ignore_ascii_case("true") => true,
            Some(v) if v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("false") => false,
            Some(v) => {
                return Err(ProviderError::construction(
                    unit,
                    format!("{FOREIGN_KEYS} must be on or off, got '{v}'"),
                ))
            }
        };

        let busy_timeout = match props.get_parsed::<u64>(BUSY_TIMEOUT_MS) {
            None => Duration::from_millis(5000),
            Some(Ok(ms)) => Duration::from_millis(ms),
            Some(Err(e)) => {
                return Err(ProviderError::construction(
                    unit,
                    format!("{BUSY_TIMEOUT_MS}: {e}"),
                ))
            }
        };

        let journal_mode = props.get(JOURNAL_MODE).unwrap_or("memory").trim().to_string();

        Ok(Self {
            url,
            ddl,
            foreign_keys,
            busy_timeout,
            journal_mode,
        })
    }
}

/// Configuration for the TCP listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Runtime worker threads serving clients.
    pub worker_threads: usize,
}

impl ListenerConfig {
    /// Listener on the loopback interface at `port` (0 picks a free port).
    pub fn new(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            worker_threads: 2,
        }
    }

    /// Sets the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Sets the number of worker threads, at least one.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(9092)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_properties() {
        let settings = SqliteSettings::from_properties("unit-x", &Properties::new()).unwrap();
        assert_eq!(settings.url, "file:unit-x?mode=memory&cache=shared");
        assert_eq!(settings.ddl, DdlGeneration::CreateTables);
        assert!(settings.foreign_keys);
        assert_eq!(settings.busy_timeout, Duration::from_secs(5));
        assert_eq!(settings.journal_mode, "memory");
    }

    #[test]
    fn overrides_are_applied() {
        let props = Properties::new()
            .with(URL, "/tmp/{unit}.db")
            .with(DDL_GENERATION, "drop-and-create")
            .with(FOREIGN_KEYS, "off")
            .with(BUSY_TIMEOUT_MS, "250");

        let settings = SqliteSettings::from_properties("orders", &props).unwrap();
        assert_eq!(settings.url, "/tmp/orders.db");
        assert_eq!(settings.ddl, DdlGeneration::DropAndCreate);
        assert!(!settings.foreign_keys);
        assert_eq!(settings.busy_timeout, Duration::from_millis(250));
    }

    #[test]
    fn distributed_transactions_are_rejected() {
        let props = Properties::new().with(TRANSACTION_TYPE, "JTA");
        let err = SqliteSettings::from_properties("unit", &props).unwrap_err();
        assert!(err.to_string().contains("JTA"));
    }

    #[test]
    fn malformed_values_are_construction_errors() {
        for (key, value) in [
            (DDL_GENERATION, "sometimes"),
            (FOREIGN_KEYS, "maybe"),
            (BUSY_TIMEOUT_MS, "soon"),
        ] {
            let props = Properties::new().with(key, value);
            let err = SqliteSettings::from_properties("unit", &props).unwrap_err();
            assert!(
                matches!(err, ProviderError::Construction { .. }),
                "{key}: {err}"
            );
        }
    }

    #[test]
    fn listener_config_builder() {
        let config = ListenerConfig::new(0).with_worker_threads(0);
        assert_eq!(config.bind_addr.port(), 0);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.worker_threads, 1);
    }
}
