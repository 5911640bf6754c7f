//! Built-in provider options.
//!
//! One table covers every supported provider's keys. Providers ignore keys
//! they do not understand, so the table is applied unconditionally.

use fixturedb_provider::Properties;

/// Property holding the listener port.
pub const PORT_PROPERTY: &str = "fixturedb.tcp.port";

/// Environment variable naming the global override file.
pub const GLOBAL_PROPERTIES_ENV: &str = "FIXTUREDB_GLOBAL_PROPERTIES";

pub use fixturedb_provider::TRANSACTION_MODE;

const UNIT_PLACEHOLDER: &str = "{unit}";

const FACTORY_DEFAULTS: &[(&str, &str)] = &[
    ("persistence.transaction-type", "RESOURCE_LOCAL"),
    ("persistence.url", "file:{unit}?mode=memory&cache=shared"),
    ("persistence.ddl-generation", "create-tables"),
    ("sqlite.foreign-keys", "on"),
    ("sqlite.busy-timeout-ms", "5000"),
    ("sqlite.journal-mode", "memory"),
];

/// Default factory construction properties for `unit`.
pub fn factory_properties(unit: &str) -> Properties {
    FACTORY_DEFAULTS
        .iter()
        .map(|(key, value)| (key.to_string(), value.replace(UNIT_PLACEHOLDER, unit)))
        .collect()
}

/// Properties for every handle the fixture creates.
pub fn handle_properties() -> Properties {
    Properties::new().with(TRANSACTION_MODE, "local")
}
