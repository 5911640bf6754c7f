//! A scripted in-process provider.
//!
//! [`ScriptedProvider`] models tables as row counters with child -> parent
//! edges. Deleting a parent while a child still has rows conflicts, which is
//! enough to exercise clearing without a real database. Every delete-all
//! attempt and every listener start/stop is recorded for assertions.

use fixturedb_provider::{
    DatabaseListener, DeleteOutcome, EntityType, HandleId, PersistenceFactory, PersistenceHandle,
    PersistenceProvider, ProviderError, ProviderResult, Properties, TypeKind, TRANSACTION_MODE,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Schema and behaviour of one scripted unit.
#[derive(Debug, Clone, Default)]
pub struct ScriptedUnit {
    types: Vec<EntityType>,
    edges: Vec<(String, String)>,
    stuck: BTreeSet<String>,
    broken: BTreeSet<String>,
    resettable: bool,
}

impl ScriptedUnit {
    /// An empty unit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resettable: true,
            ..Self::default()
        }
    }

    /// Adds an entity table.
    #[must_use]
    pub fn table(mut self, name: &str) -> Self {
        self.types
            .push(EntityType::with_type_name(name, TypeKind::Entity));
        self
    }

    /// Adds several entity tables in metamodel order.
    #[must_use]
    pub fn tables<'a>(self, names: impl IntoIterator<Item = &'a str>) -> Self {
        names.into_iter().fold(self, Self::table)
    }

    /// Adds an embeddable type with no table.
    #[must_use]
    pub fn embeddable(mut self, name: &str) -> Self {
        self.types
            .push(EntityType::with_type_name(name, TypeKind::Embeddable));
        self
    }

    /// Declares that rows of `child` reference `parent`.
    #[must_use]
    pub fn references(mut self, child: &str, parent: &str) -> Self {
        self.edges.push((child.to_string(), parent.to_string()));
        self
    }

    /// Makes every delete of `table` conflict.
    #[must_use]
    pub fn always_conflicts(mut self, table: &str) -> Self {
        self.stuck.insert(table.to_string());
        self
    }

    /// Makes every delete of `table` fail fatally.
    #[must_use]
    pub fn fails_on(mut self, table: &str) -> Self {
        self.broken.insert(table.to_string());
        self
    }

    /// Leaves the storage reset fallback unsupported.
    #[must_use]
    pub fn without_reset(mut self) -> Self {
        self.resettable = false;
        self
    }
}

/// Listener activity recorded by the scripted provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// The listener was started on the port.
    Started(u16),
    /// The listener was stopped.
    Stopped,
}

/// Provider backed by [`ScriptedUnit`]s.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    units: BTreeMap<String, ScriptedUnit>,
    constructions: AtomicUsize,
    construction_delay: Option<Duration>,
    listener_log: Arc<Mutex<Vec<ListenerEvent>>>,
    failing_start: bool,
    failing_stop: bool,
}

impl ScriptedProvider {
    /// A provider with no units.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a unit.
    #[must_use]
    pub fn unit(mut self, name: &str, unit: ScriptedUnit) -> Self {
        self.units.insert(name.to_string(), unit);
        self
    }

    /// Sleeps during every factory construction.
    #[must_use]
    pub fn construction_delay(mut self, delay: Duration) -> Self {
        self.construction_delay = Some(delay);
        self
    }

    /// Makes listener starts fail, as if the port were taken.
    #[must_use]
    pub fn failing_listener_start(mut self) -> Self {
        self.failing_start = true;
        self
    }

    /// Makes listener stops fail.
    #[must_use]
    pub fn failing_listener_stop(mut self) -> Self {
        self.failing_stop = true;
        self
    }

    /// Number of factories built so far.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    /// Listener starts and stops, in order.
    pub fn listener_events(&self) -> Vec<ListenerEvent> {
        self.listener_log.lock().clone()
    }
}

impl PersistenceProvider for ScriptedProvider {
    type Factory = ScriptedFactory;

    fn create_factory(&self, unit: &str, properties: &Properties) -> ProviderResult<ScriptedFactory> {
        let script = self
            .units
            .get(unit)
            .ok_or_else(|| ProviderError::UnknownUnit(unit.to_string()))?;
        if let Some(delay) = self.construction_delay {
            thread::sleep(delay);
        }
        self.constructions.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedFactory {
            unit: unit.to_string(),
            script: script.clone(),
            properties: properties.clone(),
            store: Arc::new(Mutex::new(Store::default())),
        })
    }

    fn create_listener(
        &self,
        port: u16,
        _properties: &Properties,
    ) -> ProviderResult<Box<dyn DatabaseListener>> {
        Ok(Box::new(ScriptedListener {
            port,
            running: false,
            failing_start: self.failing_start,
            failing_stop: self.failing_stop,
            log: Arc::clone(&self.listener_log),
        }))
    }
}

#[derive(Debug, Default)]
struct Store {
    rows: BTreeMap<String, u64>,
    attempts: Vec<String>,
    resets: usize,
    handles_opened: usize,
    handles_closed: usize,
}

/// Factory of a scripted unit.
#[derive(Debug)]
pub struct ScriptedFactory {
    unit: String,
    script: ScriptedUnit,
    properties: Properties,
    store: Arc<Mutex<Store>>,
}

impl ScriptedFactory {
    /// Properties the factory was built with.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Sets the row count of `table`.
    pub fn seed(&self, table: &str, rows: u64) {
        self.store.lock().rows.insert(table.to_string(), rows);
    }

    /// Current row count of `table`.
    pub fn rows(&self, table: &str) -> u64 {
        self.store.lock().rows.get(table).copied().unwrap_or(0)
    }

    /// Total rows across all tables.
    pub fn total_rows(&self) -> u64 {
        self.store.lock().rows.values().sum()
    }

    /// Every delete-all attempt, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.store.lock().attempts.clone()
    }

    /// Number of storage resets.
    pub fn resets(&self) -> usize {
        self.store.lock().resets
    }

    /// Handles opened and closed so far.
    pub fn handle_counts(&self) -> (usize, usize) {
        let store = self.store.lock();
        (store.handles_opened, store.handles_closed)
    }
}

impl PersistenceFactory for ScriptedFactory {
    type Handle = ScriptedHandle;

    fn unit_name(&self) -> &str {
        &self.unit
    }

    fn create_handle(&self, properties: &Properties) -> ProviderResult<ScriptedHandle> {
        if properties.get(TRANSACTION_MODE) != Some("local") {
            return Err(ProviderError::construction(
                &self.unit,
                "only local transactions are scripted",
            ));
        }
        self.store.lock().handles_opened += 1;
        Ok(ScriptedHandle {
            id: HandleId::new(),
            script: self.script.clone(),
            store: Arc::clone(&self.store),
            staged: BTreeMap::new(),
            active: false,
            closed: false,
        })
    }

    fn managed_types(&self) -> &[EntityType] {
        &self.script.types
    }

    fn reset_storage(&self) -> ProviderResult<()> {
        if !self.script.resettable {
            return Err(ProviderError::Unsupported("storage reset".into()));
        }
        let mut store = self.store.lock();
        store.resets += 1;
        store.rows.values_mut().for_each(|rows| *rows = 0);
        Ok(())
    }
}

/// Handle of a scripted unit. Writes are staged until commit.
#[derive(Debug)]
pub struct ScriptedHandle {
    id: HandleId,
    script: ScriptedUnit,
    store: Arc<Mutex<Store>>,
    staged: BTreeMap<String, u64>,
    active: bool,
    closed: bool,
}

impl ScriptedHandle {
    fn ensure_open(&self) -> ProviderResult<()> {
        if self.closed {
            return Err(ProviderError::HandleClosed(self.id.to_string()));
        }
        Ok(())
    }

    /// Stages `rows` new rows in `table`; visible to others after commit,
    /// immediately when no transaction is active.
    pub fn insert(&mut self, table: &str, rows: u64) -> ProviderResult<()> {
        self.ensure_open()?;
        if self.active {
            let current = self.visible_rows(table);
            self.staged.insert(table.to_string(), current + rows);
        } else {
            *self.store.lock().rows.entry(table.to_string()).or_insert(0) += rows;
        }
        Ok(())
    }

    /// Row count of `table` as seen by this handle.
    pub fn visible_rows(&self, table: &str) -> u64 {
        self.staged
            .get(table)
            .copied()
            .unwrap_or_else(|| self.store.lock().rows.get(table).copied().unwrap_or(0))
    }
}

impl PersistenceHandle for ScriptedHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn begin(&mut self) -> ProviderResult<()> {
        self.ensure_open()?;
        if self.active {
            return Err(ProviderError::transaction_state("transaction already active"));
        }
        self.active = true;
        Ok(())
    }

    fn commit(&mut self) -> ProviderResult<()> {
        self.ensure_open()?;
        if !self.active {
            return Err(ProviderError::transaction_state("no active transaction"));
        }
        let mut store = self.store.lock();
        for (table, rows) in std::mem::take(&mut self.staged) {
            store.rows.insert(table, rows);
        }
        self.active = false;
        Ok(())
    }

    fn rollback(&mut self) -> ProviderResult<()> {
        self.ensure_open()?;
        if !self.active {
            return Err(ProviderError::transaction_state("no active transaction"));
        }
        self.staged.clear();
        self.active = false;
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        self.active
    }

    fn delete_all(&mut self, table: &str) -> ProviderResult<DeleteOutcome> {
        self.ensure_open()?;
        self.store.lock().attempts.push(table.to_string());

        if self.script.broken.contains(table) {
            return Err(ProviderError::store(format!("cannot delete from {table}")));
        }
        let referenced = self
            .script
            .edges
            .iter()
            .any(|(child, parent)| parent == table && self.visible_rows(child) > 0);
        if referenced || self.script.stuck.contains(table) {
            return Ok(DeleteOutcome::Conflict(ProviderError::constraint(
                table,
                "FOREIGN KEY constraint failed",
            )));
        }

        let rows = self.visible_rows(table);
        self.staged.insert(table.to_string(), 0);
        Ok(DeleteOutcome::Deleted(rows))
    }

    fn close(&mut self) -> ProviderResult<()> {
        if !self.closed {
            self.closed = true;
            self.staged.clear();
            self.active = false;
            self.store.lock().handles_closed += 1;
        }
        Ok(())
    }
}

/// Listener that only records its lifecycle.
struct ScriptedListener {
    port: u16,
    running: bool,
    failing_start: bool,
    failing_stop: bool,
    log: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl DatabaseListener for ScriptedListener {
    fn start(&mut self) -> ProviderResult<()> {
        if self.running {
            return Err(ProviderError::listener("already running"));
        }
        if self.failing_start {
            return Err(ProviderError::listener(format!(
                "port {} already in use",
                self.port
            )));
        }
        self.running = true;
        self.log.lock().push(ListenerEvent::Started(self.port));
        Ok(())
    }

    fn stop(&mut self) -> ProviderResult<()> {
        if !self.running {
            return Err(ProviderError::listener("not running"));
        }
        self.running = false;
        self.log.lock().push(ListenerEvent::Stopped);
        if self.failing_stop {
            return Err(ProviderError::listener("port stuck"));
        }
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .then(|| SocketAddr::from(([127, 0, 0, 1], self.port)))
    }
}
