//! Fixture configuration.
//!
//! Override properties come from four layers, lowest priority first:
//!
//! 1. built-in defaults (see [`defaults`](crate::defaults)),
//! 2. the global override file, named by [`FixtureConfig::global_properties`]
//!    or the `FIXTUREDB_GLOBAL_PROPERTIES` environment variable,
//! 3. named property files and property readers, in the order given,
//! 4. explicit properties and the explicit port.

use crate::clearing::ClearPolicy;
use crate::defaults::{GLOBAL_PROPERTIES_ENV, PORT_PROPERTY};
use crate::error::{FixtureError, FixtureResult};
use fixturedb_provider::Properties;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Locates property files on disk.
///
/// Absolute paths are used as given. Relative paths are searched in the
/// explicit roots, then `$CARGO_MANIFEST_DIR/tests/resources`, then
/// `$CARGO_MANIFEST_DIR`, then the working directory.
#[derive(Debug, Clone, Default)]
pub struct ResourceLoader {
    roots: Vec<PathBuf>,
}

impl ResourceLoader {
    /// Creates a loader with only the implicit search locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a search root, searched before the implicit locations.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Directories searched for relative paths, in order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.roots.clone();
        if let Some(manifest) = std::env::var_os("CARGO_MANIFEST_DIR") {
            let manifest = PathBuf::from(manifest);
            paths.push(manifest.join("tests").join("resources"));
            paths.push(manifest);
        }
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        paths
    }

    /// Finds an existing file for `path`.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        self.search_paths()
            .into_iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }

    /// Resolves and parses a property file.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if no candidate exists, or the read
    /// error of the resolved file.
    pub fn load(&self, path: &Path) -> io::Result<Properties> {
        let resolved = self.resolve(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found in search path", path.display()),
            )
        })?;
        debug!(path = %resolved.display(), "loading properties");
        Properties::load(File::open(resolved)?)
    }
}

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Loaded(Properties),
}

/// Builder for fixture configuration.
///
/// ```rust
/// use fixturedb_core::{ClearPolicy, FixtureConfig};
///
/// let config = FixtureConfig::new()
///     .port(0)
///     .property("sqlite.busy-timeout-ms", "100")
///     .clear_policy(ClearPolicy::Strict);
/// let resolved = config.resolve()?;
/// assert_eq!(resolved.port, Some(0));
/// # Ok::<(), fixturedb_core::FixtureError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FixtureConfig {
    port: Option<u16>,
    sources: Vec<Source>,
    explicit: Properties,
    global: Option<PathBuf>,
    loader: ResourceLoader,
    clear_policy: ClearPolicy,
}

impl FixtureConfig {
    /// Creates a configuration with built-in defaults only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the listener on `port` around every run (0 picks a free port).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Adds a named property file. Missing or unreadable files are skipped
    /// with a warning.
    #[must_use]
    pub fn property_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    /// Reads properties from a stream now. A failing stream is skipped with a
    /// warning.
    #[must_use]
    pub fn property_reader(mut self, name: &str, reader: impl Read) -> Self {
        match Properties::load(reader) {
            Ok(props) => self.sources.push(Source::Loaded(props)),
            Err(e) => warn!(name, error = %e, "skipping unreadable property stream"),
        }
        self
    }

    /// Sets one explicit property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.explicit.set(key, value);
        self
    }

    /// Adds explicit properties.
    #[must_use]
    pub fn properties(mut self, props: &Properties) -> Self {
        self.explicit.merge(props);
        self
    }

    /// Names the global override file, taking precedence over the
    /// environment variable.
    #[must_use]
    pub fn global_properties(mut self, path: impl Into<PathBuf>) -> Self {
        self.global = Some(path.into());
        self
    }

    /// Replaces the resource loader used for relative paths.
    #[must_use]
    pub fn resource_loader(mut self, loader: ResourceLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Sets what happens when clearing stalls.
    #[must_use]
    pub fn clear_policy(mut self, policy: ClearPolicy) -> Self {
        self.clear_policy = policy;
        self
    }

    /// Merges every source into final settings.
    ///
    /// # Errors
    ///
    /// Fails if the global override file cannot be read or the port property
    /// is not a valid port.
    pub fn resolve(&self) -> FixtureResult<ResolvedConfig> {
        self.resolve_with_env(std::env::var_os(GLOBAL_PROPERTIES_ENV))
    }

    fn resolve_with_env(&self, env_global: Option<OsString>) -> FixtureResult<ResolvedConfig> {
        let mut overrides = Properties::new();

        let global = self
            .global
            .clone()
            .or_else(|| env_global.filter(|v| !v.is_empty()).map(PathBuf::from));
        if let Some(path) = global {
            let props = self
                .loader
                .load(&path)
                .map_err(|source| FixtureError::GlobalProperties { path, source })?;
            overrides.merge(&props);
        }

        for source in &self.sources {
            match source {
                Source::File(path) => match self.loader.load(path) {
                    Ok(props) => overrides.merge(&props),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping property file")
                    }
                },
                Source::Loaded(props) => overrides.merge(props),
            }
        }

        overrides.merge(&self.explicit);

        let port = match self.port {
            Some(port) => Some(port),
            None => port_property(&overrides)?,
        };

        Ok(ResolvedConfig {
            overrides,
            port,
            clear_policy: self.clear_policy,
        })
    }
}

/// Configuration after merging all sources.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    /// Properties layered over the built-in defaults.
    pub overrides: Properties,
    /// Listener port, if any.
    pub port: Option<u16>,
    /// Clearing policy.
    pub clear_policy: ClearPolicy,
}

pub(crate) fn port_property(props: &Properties) -> FixtureResult<Option<u16>> {
    match props.get_parsed::<u16>(PORT_PROPERTY) {
        None => Ok(None),
        Some(Ok(port)) => Ok(Some(port)),
        Some(Err(e)) => Err(FixtureError::config(format!(
            "invalid {PORT_PROPERTY} '{}': {e}",
            props.get(PORT_PROPERTY).unwrap_or_default()
        ))),
    }
}

/// Reads a port number stored under `key` in a property stream.
///
/// # Errors
///
/// Fails if the stream cannot be read, the key is missing or the value is
/// not a port number.
pub fn read_port(reader: impl Read, key: &str) -> FixtureResult<u16> {
    let props = Properties::load(reader)
        .map_err(|e| FixtureError::config(format!("cannot read port properties: {e}")))?;
    let value = props
        .get(key)
        .ok_or_else(|| FixtureError::config(format!("property '{key}' not found")))?;
    value
        .trim()
        .parse()
        .map_err(|e| FixtureError::config(format!("invalid port '{value}' for '{key}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn empty_config_has_no_overrides() {
        let resolved = FixtureConfig::new().resolve_with_env(None).unwrap();
        assert!(resolved.overrides.is_empty());
        assert_eq!(resolved.port, None);
        assert_eq!(resolved.clear_policy, ClearPolicy::Lenient);
    }

    #[test]
    fn precedence_explicit_over_files_over_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(dir.path(), "global.properties", "a=global\nb=global\nc=global\n");
        let named = write(dir.path(), "named.properties", "b=named\nc=named\n");

        let resolved = FixtureConfig::new()
            .global_properties(&global)
            .property_file(&named)
            .property("c", "explicit")
            .resolve_with_env(None)
            .unwrap();

        assert_eq!(resolved.overrides.get("a"), Some("global"));
        assert_eq!(resolved.overrides.get("b"), Some("named"));
        assert_eq!(resolved.overrides.get("c"), Some("explicit"));
    }

    #[test]
    fn later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "first.properties", "k=1\n");
        let second = write(dir.path(), "second.properties", "k=2\n");

        let resolved = FixtureConfig::new()
            .property_file(&first)
            .property_file(&second)
            .resolve_with_env(None)
            .unwrap();
        assert_eq!(resolved.overrides.get("k"), Some("2"));
    }

    #[test]
    fn missing_named_file_is_skipped() {
        let resolved = FixtureConfig::new()
            .property_file("does-not-exist.properties")
            .property("k", "v")
            .resolve_with_env(None)
            .unwrap();
        assert_eq!(resolved.overrides.get("k"), Some("v"));
    }

    #[test]
    fn unreadable_global_file_is_fatal() {
        let err = FixtureConfig::new()
            .global_properties("/nonexistent/global.properties")
            .resolve_with_env(None)
            .unwrap_err();
        assert!(matches!(err, FixtureError::GlobalProperties { .. }));
    }

    #[test]
    fn global_file_from_environment_value() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(dir.path(), "env.properties", "from=env\n");

        let resolved = FixtureConfig::new()
            .resolve_with_env(Some(global.into_os_string()))
            .unwrap();
        assert_eq!(resolved.overrides.get("from"), Some("env"));

        let err = FixtureConfig::new()
            .resolve_with_env(Some(OsString::from("/nonexistent/env.properties")))
            .unwrap_err();
        assert!(matches!(err, FixtureError::GlobalProperties { .. }));
    }

    #[test]
    fn explicit_global_path_beats_environment() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = write(dir.path(), "explicit.properties", "who=explicit\n");

        let resolved = FixtureConfig::new()
            .global_properties(&explicit)
            .resolve_with_env(Some(OsString::from("/nonexistent/env.properties")))
            .unwrap();
        assert_eq!(resolved.overrides.get("who"), Some("explicit"));
    }

    #[test]
    fn port_from_properties_and_explicit_port_wins() {
        let resolved = FixtureConfig::new()
            .property(PORT_PROPERTY, "9123")
            .resolve_with_env(None)
            .unwrap();
        assert_eq!(resolved.port, Some(9123));

        let resolved = FixtureConfig::new()
            .property(PORT_PROPERTY, "9123")
            .port(9200)
            .resolve_with_env(None)
            .unwrap();
        assert_eq!(resolved.port, Some(9200));
    }

    #[test]
    fn malformed_port_property_is_rejected() {
        let err = FixtureConfig::new()
            .property(PORT_PROPERTY, "http")
            .resolve_with_env(None)
            .unwrap_err();
        assert!(matches!(err, FixtureError::Config { .. }));
    }

    #[test]
    fn property_readers_layer_like_files() {
        let resolved = FixtureConfig::new()
            .property_reader("inline", "a=1\nb=1\n".as_bytes())
            .property_reader("inline2", "b=2\n".as_bytes())
            .resolve_with_env(None)
            .unwrap();
        assert_eq!(resolved.overrides.get("a"), Some("1"));
        assert_eq!(resolved.overrides.get("b"), Some("2"));
    }

    #[test]
    fn loader_searches_roots_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write(second.path(), "shared.properties", "from=second\n");

        let loader = ResourceLoader::new()
            .with_root(first.path())
            .with_root(second.path());
        let props = loader.load(Path::new("shared.properties")).unwrap();
        assert_eq!(props.get("from"), Some("second"));

        write(first.path(), "shared.properties", "from=first\n");
        let props = loader.load(Path::new("shared.properties")).unwrap();
        assert_eq!(props.get("from"), Some("first"));
    }

    #[test]
    fn loader_reports_missing_files() {
        let err = ResourceLoader::new()
            .load(Path::new("nowhere/at/all.properties"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn read_port_from_stream() {
        let port = read_port("fixturedb.tcp.port = 9092\n".as_bytes(), PORT_PROPERTY).unwrap();
        assert_eq!(port, 9092);

        assert!(read_port("other=1\n".as_bytes(), PORT_PROPERTY).is_err());
        assert!(read_port("fixturedb.tcp.port=99999\n".as_bytes(), PORT_PROPERTY).is_err());
    }
}
