//! Table DDL generated from the metamodel.

use crate::config::DdlGeneration;
use crate::error::SqliteResultExt;
use fixturedb_provider::{ColumnKind, EntityType, ProviderResult};
use rusqlite::Connection;

/// Quotes an identifier for use in SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Text | ColumnKind::Json => "TEXT",
    }
}

/// `CREATE TABLE IF NOT EXISTS` statement for one entity type.
pub(crate) fn create_table_sql(table: &str, ty: &EntityType) -> String {
    let mut parts: Vec<String> = ty
        .columns()
        .iter()
        .map(|col| {
            let mut def = format!("{} {}", quote_ident(&col.name), sql_type(col.kind));
            if col.primary_key {
                def.push_str(" PRIMARY KEY");
            } else if !col.nullable {
                def.push_str(" NOT NULL");
            }
            def
        })
        .collect();

    if parts.is_empty() {
        parts.push(format!("{} INTEGER PRIMARY KEY", quote_ident("id")));
    }

    for col in ty.columns() {
        if let Some(parent) = &col.references {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}",
                quote_ident(&col.name),
                quote_ident(parent)
            ));
        }
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        parts.join(", ")
    )
}

/// Drops every managed table with foreign keys temporarily disabled.
pub(crate) fn drop_tables(conn: &Connection, types: &[EntityType], enforce_fk: bool) -> ProviderResult<()> {
    conn.pragma_update(None, "foreign_keys", false).or_store("foreign_keys")?;
    let dropped = types
        .iter()
        .filter_map(EntityType::storage_name)
        .try_for_each(|table| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))
                .or_store(&table)
        });
    conn.pragma_update(None, "foreign_keys", enforce_fk).or_store("foreign_keys")?;
    dropped
}

/// Creates every missing managed table.
pub(crate) fn create_tables(conn: &Connection, types: &[EntityType]) -> ProviderResult<()> {
    for ty in types {
        if let Some(table) = ty.storage_name() {
            conn.execute_batch(&create_table_sql(&table, ty)).or_store(&table)?;
        }
    }
    Ok(())
}

/// Applies the configured schema generation mode.
pub(crate) fn generate(
    conn: &Connection,
    types: &[EntityType],
    mode: DdlGeneration,
    enforce_fk: bool,
) -> ProviderResult<()> {
    match mode {
        DdlGeneration::None => Ok(()),
        DdlGeneration::CreateTables => create_tables(conn, types),
        DdlGeneration::DropAndCreate => {
            drop_tables(conn, types, enforce_fk)?;
            create_tables(conn, types)
        }
    }
}

/// Names of all user tables in the connected database.
pub(crate) fn table_names(conn: &Connection) -> ProviderResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .or_store("sqlite_master")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .or_store("sqlite_master")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .or_store("sqlite_master")?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixturedb_provider::Column;

    struct Author;
    struct Book;
    struct Address;

    fn book() -> EntityType {
        EntityType::entity::<Book>()
            .column(Column::id("id"))
            .column(Column::text("title").required())
            .column(Column::integer("author_id").references("Author"))
    }

    #[test]
    fn ddl_with_foreign_key() {
        let sql = create_table_sql("Book", &book());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"Book\" (\"id\" INTEGER PRIMARY KEY, \
             \"title\" TEXT NOT NULL, \"author_id\" INTEGER, \
             FOREIGN KEY (\"author_id\") REFERENCES \"Author\")"
        );
    }

    #[test]
    fn quoting_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn create_and_drop_skip_embeddables() {
        let conn = Connection::open_in_memory().unwrap();
        let types = vec![
            EntityType::entity::<Author>().column(Column::id("id")),
            book(),
            EntityType::embeddable::<Address>(),
        ];

        generate(&conn, &types, DdlGeneration::CreateTables, true).unwrap();
        assert_eq!(table_names(&conn).unwrap(), vec!["Author", "Book"]);

        drop_tables(&conn, &types, true).unwrap();
        assert!(table_names(&conn).unwrap().is_empty());
    }

    #[test]
    fn drop_and_create_discards_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let types = vec![EntityType::entity::<Author>().column(Column::id("id"))];

        generate(&conn, &types, DdlGeneration::CreateTables, true).unwrap();
        conn.execute("INSERT INTO \"Author\" (id) VALUES (1)", []).unwrap();

        generate(&conn, &types, DdlGeneration::DropAndCreate, true).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM \"Author\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
