//! Listener wire protocol.
//!
//! Each message is one JSON object on its own line. Requests are tagged by
//! `op`, responses by `status`:
//!
//! ```text
//! -> {"op":"query","unit":"unit-x","sql":"SELECT * FROM \"TestModel\""}
//! <- {"status":"rows","columns":["id","value"],"rows":[[1,"TEST"]]}
//! ```

use fixturedb_provider::{ProviderError, ProviderResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Liveness check.
    Ping,
    /// List the tables of a unit's database.
    Tables {
        /// Persistence unit.
        unit: String,
    },
    /// Run a statement that returns rows.
    Query {
        /// Persistence unit.
        unit: String,
        /// SQL text.
        sql: String,
    },
    /// Run a statement that changes rows.
    Execute {
        /// Persistence unit.
        unit: String,
        /// SQL text.
        sql: String,
    },
}

/// A listener response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Reply to [`Request::Ping`].
    Pong,
    /// Table names.
    Tables {
        /// Names in alphabetical order.
        names: Vec<String>,
    },
    /// Query result.
    Rows(QueryRows),
    /// Number of changed rows.
    Changed {
        /// Affected row count.
        rows: u64,
    },
    /// The request failed.
    Error {
        /// Failure detail.
        message: String,
    },
}

/// Column names and row values of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names in select order.
    pub columns: Vec<String>,
    /// One value per column per row.
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Encodes a message as a single newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> ProviderResult<String> {
    let mut line =
        serde_json::to_string(message).map_err(|e| ProviderError::Protocol(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> ProviderResult<T> {
    serde_json::from_str(line.trim_end())
        .map_err(|e| ProviderError::Protocol(format!("malformed message: {e}")))
}
