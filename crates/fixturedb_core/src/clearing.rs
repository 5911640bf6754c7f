//! Order-agnostic table clearing.
//!
//! Tables are emptied without knowing their foreign key order. Every pending
//! table gets a delete-all in its own transaction; tables blocked by an
//! integrity constraint stay pending for the next pass. Each pass that makes
//! progress shrinks the pending set, so an acyclic dependency chain of N
//! tables clears in at most N passes regardless of metamodel order.
//!
//! A pass that clears nothing means the remaining tables block each other
//! (or the store keeps refusing). The sweep then stops instead of looping:
//! the first failure is logged, the factory's storage reset fallback is
//! invoked, and the remaining tables are reported as unclearable.

use crate::defaults;
use crate::error::{FixtureError, FixtureResult};
use fixturedb_provider::{
    DeleteOutcome, PersistenceFactory, PersistenceHandle, ProviderError, ProviderResult,
};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// What to do when a sweep stops making progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearPolicy {
    /// Log, reset storage and report the remaining tables.
    #[default]
    Lenient,
    /// Same as lenient, then fail with [`FixtureError::ClearingStalled`].
    Strict,
}

/// Outcome of clearing one factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Persistence unit.
    pub unit: String,
    /// Tables emptied, in the order they were cleared.
    pub cleared: Vec<String>,
    /// Managed types without a table.
    pub skipped: Vec<String>,
    /// Tables still pending when the sweep stalled.
    pub unclearable: Vec<String>,
    /// Number of passes run.
    pub passes: usize,
    /// Number of delete-all attempts.
    pub attempts: usize,
    /// First constraint failure of the last pass that had one.
    pub first_failure: Option<String>,
    /// Whether the storage reset fallback succeeded.
    pub storage_reset: bool,
    /// Wall time spent.
    pub elapsed: Duration,
}

impl ClearReport {
    fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            ..Self::default()
        }
    }

    /// Returns true if no table was left behind.
    pub fn is_complete(&self) -> bool {
        self.unclearable.is_empty()
    }
}

/// Deletes every row of every table managed by `factory`.
///
/// One handle is opened for the sweep and closed at the end; every
/// successful delete is committed on its own.
///
/// # Errors
///
/// Non-constraint provider failures abort the sweep and are returned. Under
/// [`ClearPolicy::Strict`] a stalled sweep is an error as well.
pub fn clear_tables<F: PersistenceFactory>(
    factory: &F,
    policy: ClearPolicy,
) -> FixtureResult<ClearReport> {
    let started = Instant::now();
    let unit = factory.unit_name();
    let mut report = ClearReport::new(unit);

    let mut pending = Vec::new();
    for ty in factory.managed_types() {
        match ty.storage_name() {
            Some(name) => pending.push(name),
            None => {
                warn!(unit, type_name = ty.type_name(), "skipping type without a table");
                report.skipped.push(ty.type_name().to_string());
            }
        }
    }

    if !pending.is_empty() {
        let mut handle = factory.create_handle(&defaults::handle_properties())?;
        let swept = sweep(&mut handle, &mut pending, &mut report);
        if let Err(e) = handle.close() {
            warn!(unit, error = %e, "failed to close clearing handle");
        }
        swept?;
    }

    if !pending.is_empty() {
        let first_failure = report.first_failure.clone().unwrap_or_default();
        error!(
            unit,
            pending = ?pending,
            first_failure = %first_failure,
            "clearing made no progress"
        );
        match factory.reset_storage() {
            Ok(()) => {
                warn!(unit, "storage reset after stalled clearing");
                report.storage_reset = true;
            }
            Err(e) => warn!(unit, error = %e, "storage reset failed"),
        }
        report.unclearable = pending;

        if policy == ClearPolicy::Strict {
            return Err(FixtureError::ClearingStalled {
                unit: unit.to_string(),
                pending: report.unclearable,
                first_failure,
            });
        }
    }

    report.elapsed = started.elapsed();
    info!(
        "cleared database for unit {unit} in {}ms",
        report.elapsed.as_millis()
    );
    Ok(report)
}

fn sweep<H: PersistenceHandle>(
    handle: &mut H,
    pending: &mut Vec<String>,
    report: &mut ClearReport,
) -> ProviderResult<()> {
    while !pending.is_empty() {
        let size_before = pending.len();
        report.passes += 1;
        let mut first_failure = None;
        let mut retained = Vec::with_capacity(size_before);

        for name in pending.drain(..) {
            report.attempts += 1;
            match attempt(handle, &name)? {
                None => report.cleared.push(name),
                Some(conflict) => {
                    debug!(table = %name, error = %conflict, "delete blocked, retrying next pass");
                    first_failure.get_or_insert_with(|| conflict.to_string());
                    retained.push(name);
                }
            }
        }

        *pending = retained;
        if first_failure.is_some() {
            report.first_failure = first_failure;
        }
        if pending.len() == size_before {
            break;
        }
    }
    Ok(())
}

/// Clears one table. `Ok(Some(_))` is a constraint conflict worth retrying.
fn attempt<H: PersistenceHandle>(
    handle: &mut H,
    table: &str,
) -> ProviderResult<Option<ProviderError>> {
    handle.begin()?;
    match handle.delete_all(table) {
        Ok(DeleteOutcome::Deleted(rows)) => match handle.commit() {
            Ok(()) => {
                trace!(table, rows, "table cleared");
                Ok(None)
            }
            Err(e) if e.is_constraint() => {
                rollback_quietly(handle);
                Ok(Some(e))
            }
            Err(e) => {
                rollback_quietly(handle);
                Err(e)
            }
        },
        Ok(DeleteOutcome::Conflict(e)) => {
            // Some stores end the transaction themselves when a delete aborts.
            rollback_quietly(handle);
            Ok(Some(e))
        }
        Err(e) => {
            rollback_quietly(handle);
            Err(e)
        }
    }
}

fn rollback_quietly<H: PersistenceHandle>(handle: &mut H) {
    if handle.is_transaction_active() {
        if let Err(e) = handle.rollback() {
            warn!(handle = %handle.id(), error = %e, "rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixturedb_provider::{EntityType, HandleId, Properties, TypeKind};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Rows per table plus child -> parent edges; deletes of a parent with
    /// child rows conflict.
    #[derive(Default)]
    struct Tables {
        rows: BTreeMap<String, u64>,
        edges: Vec<(String, String)>,
        stuck: Vec<String>,
        broken: Vec<String>,
        /// Conflicting deletes here also end the open transaction.
        aborting: Vec<String>,
        resets: usize,
    }

    struct TableHandle {
        id: HandleId,
        tables: Arc<Mutex<Tables>>,
        staged: Option<String>,
        active: bool,
    }

    impl PersistenceHandle for TableHandle {
        fn id(&self) -> HandleId {
            self.id
        }
        fn begin(&mut self) -> ProviderResult<()> {
            self.active = true;
            Ok(())
        }
        fn commit(&mut self) -> ProviderResult<()> {
            if let Some(table) = self.staged.take() {
                self.tables.lock().rows.insert(table, 0);
            }
            self.active = false;
            Ok(())
        }
        fn rollback(&mut self) -> ProviderResult<()> {
            if !self.active {
                return Err(ProviderError::transaction_state("no active transaction"));
            }
            self.staged = None;
            self.active = false;
            Ok(())
        }
        fn is_transaction_active(&self) -> bool {
            self.active
        }
        fn delete_all(&mut self, table: &str) -> ProviderResult<DeleteOutcome> {
            let tables = self.tables.lock();
            if tables.broken.iter().any(|t| t == table) {
                return Err(ProviderError::store("disk on fire"));
            }
            let blocked = tables.stuck.iter().any(|t| t == table)
                || tables.edges.iter().any(|(child, parent)| {
                    parent == table && tables.rows.get(child).copied().unwrap_or(0) > 0
                });
            if blocked {
                if tables.aborting.iter().any(|t| t == table) {
                    self.active = false;
                }
                return Ok(DeleteOutcome::Conflict(ProviderError::constraint(
                    table,
                    "referenced by child rows",
                )));
            }
            let rows = tables.rows.get(table).copied().unwrap_or(0);
            self.staged = Some(table.to_string());
            Ok(DeleteOutcome::Deleted(rows))
        }
        fn close(&mut self) -> ProviderResult<()> {
            Ok(())
        }
    }

    struct TableFactory {
        types: Vec<EntityType>,
        tables: Arc<Mutex<Tables>>,
    }

    impl TableFactory {
        fn new(names: &[&str], tables: Tables) -> Self {
            let mut tables = tables;
            for name in names {
                tables.rows.entry((*name).to_string()).or_insert(3);
            }
            Self {
                types: names
                    .iter()
                    .map(|n| EntityType::with_type_name(*n, TypeKind::Entity))
                    .collect(),
                tables: Arc::new(Mutex::new(tables)),
            }
        }

        fn rows(&self, table: &str) -> u64 {
            self.tables.lock().rows.get(table).copied().unwrap_or(0)
        }
    }

    impl PersistenceFactory for TableFactory {
        type Handle = TableHandle;

        fn unit_name(&self) -> &str {
            "tables"
        }
        fn create_handle(&self, _: &Properties) -> ProviderResult<TableHandle> {
            Ok(TableHandle {
                id: HandleId::new(),
                tables: Arc::clone(&self.tables),
                staged: None,
                active: false,
            })
        }
        fn managed_types(&self) -> &[EntityType] {
            &self.types
        }
        fn reset_storage(&self) -> ProviderResult<()> {
            let mut tables = self.tables.lock();
            tables.resets += 1;
            for rows in tables.rows.values_mut() {
                *rows = 0;
            }
            Ok(())
        }
    }

    fn edge(child: &str, parent: &str) -> (String, String) {
        (child.to_string(), parent.to_string())
    }

    #[test]
    fn independent_tables_clear_in_one_pass() {
        let factory = TableFactory::new(&["A", "B", "C"], Tables::default());
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.cleared, vec!["A", "B", "C"]);
        assert!(report.is_complete());
        assert_eq!(factory.rows("B"), 0);
    }

    #[test]
    fn parent_listed_first_needs_two_passes() {
        let tables = Tables {
            edges: vec![edge("Child", "Parent")],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["Parent", "Child"], tables);
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.cleared, vec!["Child", "Parent"]);
        assert!(report.first_failure.unwrap().contains("Parent"));
    }

    #[test]
    fn reversed_chain_takes_n_passes() {
        // D -> C -> B -> A, listed parents first.
        let tables = Tables {
            edges: vec![edge("B", "A"), edge("C", "B"), edge("D", "C")],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["A", "B", "C", "D"], tables);
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.passes, 4);
        assert_eq!(report.attempts, 4 + 3 + 2 + 1);
        assert!(report.is_complete());
    }

    #[test]
    fn embeddables_are_skipped() {
        let mut factory = TableFactory::new(&["A"], Tables::default());
        factory
            .types
            .push(EntityType::with_type_name("Address", TypeKind::Embeddable));

        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();
        assert_eq!(report.skipped, vec!["Address"]);
        assert_eq!(report.cleared, vec!["A"]);
    }

    #[test]
    fn stuck_table_is_reported_and_storage_reset() {
        let tables = Tables {
            stuck: vec!["Locked".into()],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["Locked", "Free"], tables);
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.unclearable, vec!["Locked"]);
        assert_eq!(report.cleared, vec!["Free"]);
        assert!(report.storage_reset);
        assert_eq!(factory.tables.lock().resets, 1);
        assert_eq!(factory.rows("Locked"), 0);
    }

    #[test]
    fn conflict_after_store_rollback_is_retried() {
        let tables = Tables {
            edges: vec![edge("Child", "Parent")],
            aborting: vec!["Parent".into()],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["Parent", "Child"], tables);
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.cleared, vec!["Child", "Parent"]);
        assert_eq!(factory.rows("Parent"), 0);
    }

    #[test]
    fn aborting_stuck_table_is_unclearable_not_fatal() {
        let tables = Tables {
            stuck: vec!["Guarded".into()],
            aborting: vec!["Guarded".into()],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["Guarded", "Free"], tables);
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.unclearable, vec!["Guarded"]);
        assert_eq!(report.cleared, vec!["Free"]);
        assert!(report.storage_reset);
    }

    #[test]
    fn strict_policy_fails_on_stall() {
        let tables = Tables {
            stuck: vec!["Locked".into()],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["Locked"], tables);
        let err = clear_tables(&factory, ClearPolicy::Strict).unwrap_err();

        match err {
            FixtureError::ClearingStalled {
                unit,
                pending,
                first_failure,
            } => {
                assert_eq!(unit, "tables");
                assert_eq!(pending, vec!["Locked"]);
                assert!(first_failure.contains("Locked"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cycles_terminate() {
        let tables = Tables {
            edges: vec![edge("A", "B"), edge("B", "A")],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["A", "B"], tables);
        let report = clear_tables(&factory, ClearPolicy::Lenient).unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.unclearable, vec!["A", "B"]);
    }

    #[test]
    fn fatal_errors_abort() {
        let tables = Tables {
            broken: vec!["B".into()],
            ..Tables::default()
        };
        let factory = TableFactory::new(&["A", "B", "C"], tables);
        let err = clear_tables(&factory, ClearPolicy::Lenient).unwrap_err();

        assert!(matches!(err, FixtureError::Provider(ProviderError::Store(_))));
        assert_eq!(factory.rows("A"), 0);
        assert_eq!(factory.rows("C"), 3);
    }

    #[test]
    fn no_tables_no_handle() {
        let factory = TableFactory::new(&[], Tables::default());
        let report = clear_tables(&factory, ClearPolicy::Strict).unwrap();
        assert_eq!(report.passes, 0);
        assert!(report.is_complete());
    }
}
