//! Blocking client for the listener protocol.

use crate::protocol::{decode_line, encode_line, QueryRows, Request, Response};
use fixturedb_provider::{ProviderError, ProviderResult};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection to a running [`SqliteListener`](crate::SqliteListener).
pub struct ListenerClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl ListenerClient {
    /// Connects to a listener.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the connection cannot be established.
    pub fn connect(addr: impl ToSocketAddrs) -> ProviderResult<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Sends a request and waits for its response.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or an undecodable response. An error response is
    /// returned as `Ok(Response::Error { .. })`.
    pub fn request(&mut self, request: &Request) -> ProviderResult<Response> {
        let line = encode_line(request)?;
        self.send_raw(line.trim_end())
    }

    /// Sends a raw line and decodes the response.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or an undecodable response.
    pub fn send_raw(&mut self, line: &str) -> ProviderResult<Response> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(ProviderError::Protocol("listener closed the connection".into()));
        }
        decode_line(&reply)
    }

    /// Checks the listener is alive.
    ///
    /// # Errors
    ///
    /// Fails if the listener does not answer with a pong.
    pub fn ping(&mut self) -> ProviderResult<()> {
        match self.request(&Request::Ping)? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Lists the tables of `unit`.
    ///
    /// # Errors
    ///
    /// Propagates listener-side failures as store errors.
    pub fn tables(&mut self, unit: &str) -> ProviderResult<Vec<String>> {
        match self.request(&Request::Tables { unit: unit.into() })? {
            Response::Tables { names } => Ok(names),
            other => Err(unexpected(other)),
        }
    }

    /// Runs a query against `unit`.
    ///
    /// # Errors
    ///
    /// Propagates listener-side failures as store errors.
    pub fn query(&mut self, unit: &str, sql: &str) -> ProviderResult<QueryRows> {
        let request = Request::Query {
            unit: unit.into(),
            sql: sql.into(),
        };
        match self.request(&request)? {
            Response::Rows(rows) => Ok(rows),
            other => Err(unexpected(other)),
        }
    }

    /// Runs a changing statement against `unit` and returns the affected
    /// row count.
    ///
    /// # Errors
    ///
    /// Propagates listener-side failures as store errors.
    pub fn execute(&mut self, unit: &str, sql: &str) -> ProviderResult<u64> {
        let request = Request::Execute {
            unit: unit.into(),
            sql: sql.into(),
        };
        match self.request(&request)? {
            Response::Changed { rows } => Ok(rows),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> ProviderError {
    match response {
        Response::Error { message } => ProviderError::Store(message),
        other => ProviderError::Protocol(format!("unexpected response: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use crate::server::SqliteListener;
    use fixturedb_provider::{DatabaseListener, Properties};
    use rusqlite::{Connection, OpenFlags};

    fn keeper(unit: &str) -> Connection {
        let conn = Connection::open_with_flags(
            format!("file:{unit}?mode=memory&cache=shared"),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .unwrap();
        conn.execute_batch("CREATE TABLE \"Note\" (id INTEGER PRIMARY KEY, body TEXT)")
            .unwrap();
        conn
    }

    #[test]
    fn remote_reads_see_local_writes() {
        let keeper = keeper("client-remote");
        keeper
            .execute("INSERT INTO \"Note\" (body) VALUES ('hello')", [])
            .unwrap();

        let mut listener = SqliteListener::new(ListenerConfig::new(0), Properties::new());
        listener.start().unwrap();
        let mut client = ListenerClient::connect(listener.local_addr().unwrap()).unwrap();

        assert_eq!(client.tables("client-remote").unwrap(), vec!["Note"]);
        let rows = client
            .query("client-remote", "SELECT body FROM \"Note\"")
            .unwrap();
        assert_eq!(rows.columns, vec!["body"]);
        assert_eq!(rows.len(), 1);

        let changed = client
            .execute("client-remote", "DELETE FROM \"Note\"")
            .unwrap();
        assert_eq!(changed, 1);
        let left: i64 = keeper
            .query_row("SELECT COUNT(*) FROM \"Note\"", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 0);

        listener.stop().unwrap();
    }

    #[test]
    fn error_responses_become_store_errors() {
        let _keeper = keeper("client-errors");
        let mut listener = SqliteListener::new(ListenerConfig::new(0), Properties::new());
        listener.start().unwrap();
        let mut client = ListenerClient::connect(listener.local_addr().unwrap()).unwrap();

        let err = client
            .query("client-errors", "SELECT * FROM nowhere")
            .unwrap_err();
        assert!(matches!(err, ProviderError::Store(_)));

        listener.stop().unwrap();
    }
}
