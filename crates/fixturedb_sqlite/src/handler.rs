//! Request handling for listener connections.

use crate::config::SqliteSettings;
use crate::handle::{open_connection, query_rows};
use crate::protocol::{Request, Response};
use crate::schema;
use fixturedb_provider::{ProviderResult, Properties};
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::debug;

/// Serves requests for one client connection.
///
/// Database connections are opened lazily per unit and kept for the life of
/// the client connection, so they are never shared between threads.
pub struct RequestHandler {
    properties: Properties,
    connections: HashMap<String, Connection>,
}

impl RequestHandler {
    /// Creates a handler resolving unit URLs from `properties`.
    pub fn new(properties: Properties) -> Self {
        Self {
            properties,
            connections: HashMap::new(),
        }
    }

    /// Handles one request. Failures become [`Response::Error`].
    pub fn handle(&mut self, request: Request) -> Response {
        debug!(?request, "listener request");
        let result = match request {
            Request::Ping => Ok(Response::Pong),
            Request::Tables { unit } => self
                .connection(&unit)
                .and_then(schema::table_names)
                .map(|names| Response::Tables { names }),
            Request::Query { unit, sql } => self
                .connection(&unit)
                .and_then(|conn| query_rows(conn, &sql))
                .map(Response::Rows),
            Request::Execute { unit, sql } => self.connection(&unit).and_then(|conn| {
                conn.execute(&sql, [])
                    .map(|n| Response::Changed { rows: n as u64 })
                    .map_err(|e| crate::error::classify(&sql, e))
            }),
        };

        result.unwrap_or_else(|e| Response::Error {
            message: e.to_string(),
        })
    }

    fn connection(&mut self, unit: &str) -> ProviderResult<&Connection> {
        if !self.connections.contains_key(unit) {
            let settings = SqliteSettings::from_properties(unit, &self.properties)?;
            let conn = open_connection(&settings)?;
            self.connections.insert(unit.to_string(), conn);
        }
        // Inserted above when missing.
        Ok(&self.connections[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn handler(unit: &str) -> (Connection, RequestHandler) {
        let props = Properties::new().with(config::URL, format!("file:{unit}?mode=memory&cache=shared"));
        let settings = SqliteSettings::from_properties(unit, &props).unwrap();
        let keeper = open_connection(&settings).unwrap();
        keeper
            .execute_batch("CREATE TABLE \"Item\" (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        (keeper, RequestHandler::new(props))
    }

    #[test]
    fn ping() {
        let mut h = RequestHandler::new(Properties::new());
        assert_eq!(h.handle(Request::Ping), Response::Pong);
    }

    #[test]
    fn execute_then_query() {
        let (_keeper, mut h) = handler("handler-exec");
        let changed = h.handle(Request::Execute {
            unit: "handler-exec".into(),
            sql: "INSERT INTO \"Item\" (name) VALUES ('x')".into(),
        });
        assert_eq!(changed, Response::Changed { rows: 1 });

        match h.handle(Request::Query {
            unit: "handler-exec".into(),
            sql: "SELECT name FROM \"Item\"".into(),
        }) {
            Response::Rows(rows) => assert_eq!(rows.rows, vec![vec![serde_json::json!("x")]]),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            h.handle(Request::Tables {
                unit: "handler-exec".into()
            }),
            Response::Tables {
                names: vec!["Item".into()]
            }
        );
    }

    #[test]
    fn failures_become_error_responses() {
        let (_keeper, mut h) = handler("handler-error");
        let response = h.handle(Request::Query {
            unit: "handler-error".into(),
            sql: "SELECT * FROM missing".into(),
        });
        assert!(matches!(response, Response::Error { message } if message.contains("missing")));
    }
}
