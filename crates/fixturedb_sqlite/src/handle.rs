//! SQLite-backed persistence handle.

use crate::config::SqliteSettings;
use crate::entity::{self, Entity};
use crate::error::{classify, SqliteResultExt};
use crate::protocol::QueryRows;
use crate::schema::{self, quote_ident};
use fixturedb_provider::{
    DeleteOutcome, HandleId, PersistenceHandle, ProviderError, ProviderResult,
};
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};
use tracing::trace;

/// Opens and configures a connection for `settings`.
pub(crate) fn open_connection(settings: &SqliteSettings) -> ProviderResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&settings.url, flags).or_store(&settings.url)?;
    conn.busy_timeout(settings.busy_timeout).or_store("busy_timeout")?;
    conn.pragma_update(None, "foreign_keys", settings.foreign_keys)
        .or_store("foreign_keys")?;
    conn.pragma_update_and_check(None, "journal_mode", &settings.journal_mode, |row| {
        row.get::<_, String>(0)
    })
    .or_store("journal_mode")?;
    Ok(conn)
}

/// A session on one connection to a unit's database.
///
/// Transactions are driven explicitly with [`begin`](PersistenceHandle::begin),
/// [`commit`](PersistenceHandle::commit) and
/// [`rollback`](PersistenceHandle::rollback); statements issued outside a
/// transaction autocommit.
pub struct SqliteHandle {
    id: HandleId,
    unit: String,
    conn: Option<Connection>,
}

impl std::fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("id", &self.id)
            .field("unit", &self.unit)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl SqliteHandle {
    pub(crate) fn open(unit: &str, settings: &SqliteSettings) -> ProviderResult<Self> {
        let conn = open_connection(settings)?;
        let id = HandleId::new();
        trace!(%id, unit, "opened handle");
        Ok(Self {
            id,
            unit: unit.to_string(),
            conn: Some(conn),
        })
    }

    /// The persistence unit this handle belongs to.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Returns true until the handle is closed.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> ProviderResult<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| ProviderError::HandleClosed(self.id.to_string()))
    }

    /// Inserts `entity`, writing a generated id back into it.
    ///
    /// Returns the row id of the inserted row.
    ///
    /// # Errors
    ///
    /// Fails on mapping errors, constraint violations or a closed handle.
    pub fn persist<E: Entity>(&mut self, entity: &mut E) -> ProviderResult<i64> {
        let ty = E::entity_type();
        let table = entity::table_of(&ty)?;
        let mut object = entity::to_object(&table, &*entity)?;

        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in ty.columns() {
            let value = object.get(&column.name).unwrap_or(&Value::Null);
            if column.primary_key && value.is_null() {
                continue;
            }
            names.push(quote_ident(&column.name));
            values.push(entity::to_sql(&table, column, value)?);
        }

        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&table))
        } else {
            let slots: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&table),
                names.join(", "),
                slots.join(", ")
            )
        };

        let conn = self.conn()?;
        conn.execute(&sql, params_from_iter(values)).or_store(&table)?;
        let rowid = conn.last_insert_rowid();

        if let Some(id_col) = ty.id_column() {
            if object.get(&id_col.name).map_or(true, Value::is_null) {
                object.insert(id_col.name.clone(), Value::from(rowid));
                *entity = entity::from_object(&table, object)?;
            }
        }
        Ok(rowid)
    }

    /// Loads the entity with primary key `id`.
    ///
    /// # Errors
    ///
    /// Fails if the type has no id column, on mapping errors or a closed
    /// handle.
    pub fn find<E: Entity>(&self, id: i64) -> ProviderResult<Option<E>> {
        let ty = E::entity_type();
        let table = entity::table_of(&ty)?;
        let id_col = ty
            .id_column()
            .ok_or_else(|| ProviderError::mapping(&table, "no id column declared"))?;

        let sql = format!(
            "{} WHERE {} = ?1",
            select_sql(&table, &ty),
            quote_ident(&id_col.name)
        );
        let conn = self.conn()?;
        let row = conn
            .query_row(&sql, [id], |row| read_object(&table, &ty, row))
            .optional()
            .or_store(&table)?;

        match row {
            Some(object) => Ok(Some(entity::from_object(&table, object?)?)),
            None => Ok(None),
        }
    }

    /// Loads every row of `E`'s table.
    ///
    /// # Errors
    ///
    /// Fails on mapping errors or a closed handle.
    pub fn find_all<E: Entity>(&self) -> ProviderResult<Vec<E>> {
        let ty = E::entity_type();
        let table = entity::table_of(&ty)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&select_sql(&table, &ty)).or_store(&table)?;
        let objects = stmt
            .query_map([], |row| read_object(&table, &ty, row))
            .or_store(&table)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .or_store(&table)?;

        objects
            .into_iter()
            .map(|object| entity::from_object(&table, object?))
            .collect()
    }

    /// Number of rows in `table`.
    ///
    /// # Errors
    ///
    /// Fails if the table does not exist or the handle is closed.
    pub fn count(&self, table: &str) -> ProviderResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let n: i64 = self
            .conn()?
            .query_row(&sql, [], |row| row.get(0))
            .or_store(table)?;
        Ok(n.max(0) as u64)
    }

    /// Runs a statement and returns the number of changed rows.
    ///
    /// # Errors
    ///
    /// Constraint failures are reported as [`ProviderError::Constraint`].
    pub fn execute(&self, sql: &str) -> ProviderResult<u64> {
        let changed = self.conn()?.execute(sql, []).or_store(sql)?;
        Ok(changed as u64)
    }

    /// Runs a query and returns untyped rows.
    ///
    /// # Errors
    ///
    /// Fails on invalid SQL or a closed handle.
    pub fn query_rows(&self, sql: &str) -> ProviderResult<QueryRows> {
        query_rows(self.conn()?, sql)
    }

    /// Tables present in the database.
    ///
    /// # Errors
    ///
    /// Fails if the catalog cannot be read or the handle is closed.
    pub fn table_names(&self) -> ProviderResult<Vec<String>> {
        schema::table_names(self.conn()?)
    }
}

fn select_sql(table: &str, ty: &fixturedb_provider::EntityType) -> String {
    let columns: Vec<String> = ty.columns().iter().map(|c| quote_ident(&c.name)).collect();
    format!("SELECT {} FROM {}", columns.join(", "), quote_ident(table))
}

/// Reads a row into a JSON object. Mapping failures are returned in the inner
/// result so they survive rusqlite's row callback.
fn read_object(
    table: &str,
    ty: &fixturedb_provider::EntityType,
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<ProviderResult<Map<String, Value>>> {
    let mut object = Map::new();
    for (idx, column) in ty.columns().iter().enumerate() {
        match entity::from_sql(table, column, row.get_ref(idx)?) {
            Ok(value) => {
                object.insert(column.name.clone(), value);
            }
            Err(e) => return Ok(Err(e)),
        }
    }
    Ok(Ok(object))
}

/// Runs `sql` and collects every row as JSON values.
pub(crate) fn query_rows(conn: &Connection, sql: &str) -> ProviderResult<QueryRows> {
    let mut stmt = conn.prepare(sql).or_store(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(entity::untyped_from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .or_store(sql)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .or_store(sql)?;
    Ok(QueryRows { columns, rows })
}

impl PersistenceHandle for SqliteHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn begin(&mut self) -> ProviderResult<()> {
        if self.is_transaction_active() {
            return Err(ProviderError::transaction_state(format!(
                "{} already has an active transaction",
                self.id
            )));
        }
        self.conn()?.execute_batch("BEGIN").or_store("begin")
    }

    fn commit(&mut self) -> ProviderResult<()> {
        if !self.is_transaction_active() {
            return Err(ProviderError::transaction_state(format!(
                "{} has no active transaction to commit",
                self.id
            )));
        }
        self.conn()?.execute_batch("COMMIT").or_store("commit")
    }

    fn rollback(&mut self) -> ProviderResult<()> {
        if !self.is_transaction_active() {
            return Err(ProviderError::transaction_state(format!(
                "{} has no active transaction to roll back",
                self.id
            )));
        }
        self.conn()?.execute_batch("ROLLBACK").or_store("rollback")
    }

    fn is_transaction_active(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_autocommit())
    }

    fn delete_all(&mut self, storage_name: &str) -> ProviderResult<DeleteOutcome> {
        let sql = format!("DELETE FROM {}", quote_ident(storage_name));
        match self.conn()?.execute(&sql, []) {
            Ok(n) => Ok(DeleteOutcome::Deleted(n as u64)),
            Err(e) => {
                let err = classify(storage_name, e);
                if err.is_constraint() {
                    Ok(DeleteOutcome::Conflict(err))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn close(&mut self) -> ProviderResult<()> {
        match self.conn.take() {
            Some(conn) => {
                trace!(id = %self.id, unit = %self.unit, "closing handle");
                conn.close().map_err(|(_, e)| classify("close", e))
            }
            None => Ok(()),
        }
    }
}
