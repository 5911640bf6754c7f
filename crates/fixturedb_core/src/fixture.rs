//! Fixture controller.

use crate::clearing::{clear_tables, ClearPolicy, ClearReport};
use crate::config::{port_property, FixtureConfig};
use crate::error::{BoxError, FixtureError, FixtureResult};
use crate::registry::{HandleOf, Registry};
use crate::session::Session;
use fixturedb_provider::{DatabaseListener, PersistenceProvider};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Wraps test bodies with session tracking and database cleanup.
///
/// Every [`run`](Self::run) gets a fresh [`FixtureScope`]. After the body
/// returns, successfully or not, the fixture checks that no session left a
/// transaction open, closes all sessions and empties every table of every
/// unit the body touched.
///
/// # Example
///
/// ```rust
/// use fixturedb_core::{FixtureConfig, PersistenceFixture};
/// use fixturedb_provider::{Column, EntityType};
/// use fixturedb_sqlite::SqliteProvider;
///
/// struct Note;
///
/// let provider = SqliteProvider::new().unit(
///     "doc-fixture",
///     [EntityType::entity::<Note>().column(Column::id("id"))],
/// );
/// let fixture = PersistenceFixture::new(provider, FixtureConfig::new())?;
///
/// fixture.run(|scope| {
///     let session = scope.session("doc-fixture")?;
///     session.lock()?.execute("INSERT INTO \"Note\" (id) VALUES (1)")?;
///     Ok(())
/// })?;
///
/// let rows = fixture.run(|scope| {
///     let session = scope.session("doc-fixture")?;
///     let rows = session.lock()?.count("Note")?;
///     Ok(rows)
/// })?;
/// assert_eq!(rows, 0);
/// # Ok::<(), fixturedb_core::FixtureError>(())
/// ```
pub struct PersistenceFixture<P: PersistenceProvider> {
    registry: Arc<Registry<P>>,
    port: Option<u16>,
    clear_policy: ClearPolicy,
    listener: Mutex<Option<Box<dyn DatabaseListener>>>,
    listener_addr: Mutex<Option<SocketAddr>>,
    last_reports: Mutex<Vec<ClearReport>>,
}

impl<P: PersistenceProvider> fmt::Debug for PersistenceFixture<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceFixture")
            .field("registry", &self.registry)
            .field("port", &self.port)
            .field("clear_policy", &self.clear_policy)
            .finish()
    }
}

impl<P: PersistenceProvider> PersistenceFixture<P> {
    /// Creates a fixture with its own registry.
    ///
    /// # Errors
    ///
    /// Fails if the configuration cannot be resolved.
    pub fn new(provider: P, config: FixtureConfig) -> FixtureResult<Self> {
        let resolved = config.resolve()?;
        let registry = Arc::new(Registry::new(provider, resolved.overrides));
        Ok(Self::assemble(registry, resolved.port, resolved.clear_policy))
    }

    /// Creates a fixture sharing `registry`, and so its factories, with other
    /// fixtures. Property sources in `config` are ignored in favour of the
    /// registry's overrides; the port and clearing policy still apply.
    ///
    /// # Errors
    ///
    /// Fails if the configuration cannot be resolved.
    pub fn with_registry(registry: Arc<Registry<P>>, config: FixtureConfig) -> FixtureResult<Self> {
        let resolved = config.resolve()?;
        let port = match resolved.port {
            Some(port) => Some(port),
            None => port_property(registry.overrides())?,
        };
        Ok(Self::assemble(registry, port, resolved.clear_policy))
    }

    fn assemble(registry: Arc<Registry<P>>, port: Option<u16>, clear_policy: ClearPolicy) -> Self {
        Self {
            registry,
            port,
            clear_policy,
            listener: Mutex::new(None),
            listener_addr: Mutex::new(None),
            last_reports: Mutex::new(Vec::new()),
        }
    }

    /// The registry backing this fixture.
    pub fn registry(&self) -> &Arc<Registry<P>> {
        &self.registry
    }

    /// Configured listener port.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Address of the running listener, while a run is in progress.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        *self.listener_addr.lock()
    }

    /// Clearing reports of the most recent run, one per touched unit.
    pub fn last_reports(&self) -> Vec<ClearReport> {
        self.last_reports.lock().clone()
    }

    /// Runs `body` with cleanup.
    ///
    /// The result reports, in priority order: the body's own failure, a
    /// transaction left open by the body, a clearing failure, or the body's
    /// value. A panic in the body is resumed once cleanup has finished.
    ///
    /// # Errors
    ///
    /// See above; listener start failures abort the run before the body, and
    /// stop failures are reported when everything else succeeded.
    pub fn run<T, F>(&self, body: F) -> FixtureResult<T>
    where
        F: FnOnce(&mut FixtureScope<'_, P>) -> Result<T, BoxError>,
    {
        let Some(port) = self.port else {
            return self.run_protocol(body);
        };

        let mut slot = self.listener.lock();
        let listener = match &mut *slot {
            Some(listener) => listener,
            empty => empty.insert(
                self.registry
                    .provider()
                    .create_listener(port, self.registry.overrides())?,
            ),
        };
        listener.start()?;
        *self.listener_addr.lock() = listener.local_addr();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_protocol(body)));

        let stopped = listener.stop();
        *self.listener_addr.lock() = None;
        drop(slot);

        match outcome {
            Err(panic) => {
                if let Err(e) = stopped {
                    error!(error = %e, "failed to stop listener");
                }
                panic::resume_unwind(panic)
            }
            Ok(Err(e)) => {
                if let Err(stop) = stopped {
                    error!(error = %stop, "failed to stop listener");
                }
                Err(e)
            }
            Ok(Ok(value)) => {
                stopped?;
                Ok(value)
            }
        }
    }

    fn run_protocol<T, F>(&self, body: F) -> FixtureResult<T>
    where
        F: FnOnce(&mut FixtureScope<'_, P>) -> Result<T, BoxError>,
    {
        let mut scope = FixtureScope::new(&self.registry);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut scope)));

        let leaked = match &outcome {
            Ok(Ok(_)) => scope.roll_back_leaks(),
            _ => Ok(()),
        };
        scope.close_sessions();
        let (reports, cleared) = scope.clear_units(self.clear_policy);
        *self.last_reports.lock() = reports;

        match outcome {
            Err(panic) => {
                if let Err(e) = cleared {
                    error!(error = %e, "clearing failed after panic");
                }
                panic::resume_unwind(panic)
            }
            Ok(Err(body_error)) => {
                if let Err(e) = cleared {
                    error!(error = %e, "clearing failed after test failure");
                }
                Err(FixtureError::from_body(body_error))
            }
            Ok(Ok(value)) => {
                if let Err(leak) = leaked {
                    if let Err(e) = cleared {
                        error!(error = %e, "clearing failed after leaked transaction");
                    }
                    return Err(leak);
                }
                cleared?;
                Ok(value)
            }
        }
    }
}

/// Per-run state: the sessions handed out and the units they came from.
pub struct FixtureScope<'a, P: PersistenceProvider> {
    registry: &'a Registry<P>,
    factories: BTreeMap<String, Arc<P::Factory>>,
    sessions: Vec<Session<HandleOf<P>>>,
}

impl<'a, P: PersistenceProvider> FixtureScope<'a, P> {
    fn new(registry: &'a Registry<P>) -> Self {
        Self {
            registry,
            factories: BTreeMap::new(),
            sessions: Vec::new(),
        }
    }

    /// Opens a tracked session on `unit`, creating its factory on first use.
    ///
    /// # Errors
    ///
    /// Propagates factory or handle construction failures.
    pub fn session(&mut self, unit: &str) -> FixtureResult<Session<HandleOf<P>>> {
        let factory = self.registry.factory(unit)?;
        let handle = self.registry.handle(&factory)?;
        self.factories.entry(unit.to_string()).or_insert(factory);

        let session = Session::new(unit, handle);
        self.sessions.push(session.clone());
        Ok(session)
    }

    /// Units that will be cleared after the run.
    pub fn touched_units(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Number of sessions still open.
    pub fn open_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_open()).count()
    }

    fn roll_back_leaks(&self) -> FixtureResult<()> {
        let leaked: Vec<&Session<HandleOf<P>>> = self
            .sessions
            .iter()
            .filter(|session| session.is_transaction_active())
            .collect();
        let Some(first) = leaked.first() else {
            return Ok(());
        };

        for session in &leaked {
            warn!(handle = %session.id(), unit = session.unit(), "rolling back leaked transaction");
            if let Err(e) = session.rollback() {
                warn!(handle = %session.id(), error = %e, "rollback of leaked transaction failed");
            }
        }
        Err(FixtureError::LeakedTransaction {
            handle: first.id(),
            count: leaked.len(),
        })
    }

    fn close_sessions(&mut self) {
        for session in self.sessions.drain(..) {
            if let Err(e) = session.close() {
                warn!(handle = %session.id(), unit = session.unit(), error = %e, "failed to close session");
            }
        }
    }

    fn clear_units(&self, policy: ClearPolicy) -> (Vec<ClearReport>, FixtureResult<()>) {
        let mut reports = Vec::with_capacity(self.factories.len());
        let mut first_error = None;
        for factory in self.factories.values() {
            match clear_tables(factory.as_ref(), policy) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(error = %e, "clearing failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        (reports, first_error.map_or(Ok(()), Err))
    }
}
