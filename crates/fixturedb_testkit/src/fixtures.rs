//! Fixture helpers.
//!
//! Named in-memory SQLite databases are shared by every connection in the
//! process, and tests run in parallel, so each test should use its own unit
//! name from [`unique_unit`].

use fixturedb_core::{FixtureConfig, FixtureResult, PersistenceFixture};
use fixturedb_provider::PersistenceProvider;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A unit name unique to this process run, e.g. `library-1a2b3c4d`.
pub fn unique_unit(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// Builds a fixture with default configuration.
///
/// # Errors
///
/// Fails if the configuration cannot be resolved.
pub fn fixture<P: PersistenceProvider>(provider: P) -> FixtureResult<PersistenceFixture<P>> {
    PersistenceFixture::new(provider, FixtureConfig::new())
}

/// Property files in a temporary directory, removed on drop.
#[derive(Debug)]
pub struct TempProperties {
    dir: TempDir,
}

impl TempProperties {
    /// Creates an empty directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    /// The directory, usable as a resource root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `name` with one `key=value` line per entry.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn write(&self, name: &str, entries: &[(&str, &str)]) -> io::Result<PathBuf> {
        let text: String = entries
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect();
        let path = self.dir.path().join(name);
        fs::write(&path, text)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixturedb_provider::Properties;

    #[test]
    fn units_are_unique() {
        let a = unique_unit("shop");
        let b = unique_unit("shop");
        assert_ne!(a, b);
        assert!(a.starts_with("shop-"));
        assert_eq!(a.len(), "shop-".len() + 8);
    }

    #[test]
    fn written_files_parse_back() {
        let props = TempProperties::new().unwrap();
        let path = props
            .write("unit.properties", &[("a", "1"), ("b", "two")])
            .unwrap();
        let parsed = Properties::load(fs::File::open(path).unwrap()).unwrap();
        assert_eq!(parsed.get("a"), Some("1"));
        assert_eq!(parsed.get("b"), Some("two"));
    }
}
