//! Mapping of SQLite errors into provider errors.

use fixturedb_provider::{ProviderError, ProviderResult};
use rusqlite::ErrorCode;

/// Converts a SQLite error, keeping constraint failures distinguishable.
pub(crate) fn classify(target: &str, err: rusqlite::Error) -> ProviderError {
    match &err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            let detail = message.clone().unwrap_or_else(|| err.to_string());
            ProviderError::constraint(target, detail)
        }
        _ => ProviderError::store(format!("{target}: {err}")),
    }
}

/// Extension for attaching a target name to SQLite results.
pub(crate) trait SqliteResultExt<T> {
    /// Maps the error through [`classify`].
    fn or_store(self, target: &str) -> ProviderResult<T>;
}

impl<T> SqliteResultExt<T> for rusqlite::Result<T> {
    fn or_store(self, target: &str) -> ProviderResult<T> {
        self.map_err(|e| classify(target, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn foreign_key_failures_are_constraints() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent);
             INSERT INTO parent (id) VALUES (1);
             INSERT INTO child (id, parent_id) VALUES (1, 1);",
        )
        .unwrap();

        let err = conn.execute("DELETE FROM parent", []).or_store("parent").unwrap_err();
        assert!(err.is_constraint(), "{err}");
    }

    #[test]
    fn missing_table_is_not_a_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute("DELETE FROM nope", []).or_store("nope").unwrap_err();
        assert!(!err.is_constraint());
        assert!(err.to_string().contains("nope"));
    }
}
