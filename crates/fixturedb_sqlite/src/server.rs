//! TCP listener exposing in-memory databases to other processes.

use crate::config::ListenerConfig;
use crate::handler::RequestHandler;
use crate::protocol::{decode_line, encode_line, Request, Response};
use fixturedb_provider::{DatabaseListener, ProviderError, ProviderResult, Properties};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// The database listener.
///
/// The listener owns a small tokio runtime. While running, every accepted
/// client is served by its own task with its own database connections, so a
/// test's shared in-memory databases can be inspected from outside while the
/// test runs. [`stop`](DatabaseListener::stop) aborts every client task and
/// waits for them, so no request is served once it returns.
///
/// # Example
///
/// ```no_run
/// use fixturedb_provider::{DatabaseListener, Properties};
/// use fixturedb_sqlite::{ListenerConfig, SqliteListener};
///
/// let mut listener = SqliteListener::new(ListenerConfig::new(9092), Properties::new());
/// listener.start()?;
/// // ... connect with `ListenerClient` ...
/// listener.stop()?;
/// # Ok::<(), fixturedb_provider::ProviderError>(())
/// ```
pub struct SqliteListener {
    config: ListenerConfig,
    properties: Properties,
    running: Option<Running>,
}

struct Running {
    addr: SocketAddr,
    runtime: Runtime,
    shutdown: oneshot::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl SqliteListener {
    /// Creates a stopped listener.
    pub fn new(config: ListenerConfig, properties: Properties) -> Self {
        Self {
            config,
            properties,
            running: None,
        }
    }

    /// Returns true while accepting connections.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl DatabaseListener for SqliteListener {
    fn start(&mut self) -> ProviderResult<()> {
        if let Some(running) = &self.running {
            return Err(ProviderError::listener(format!(
                "already running on {}",
                running.addr
            )));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name("fixturedb-listener")
            .enable_all()
            .build()
            .map_err(|e| ProviderError::listener(format!("cannot start runtime: {e}")))?;

        let bind_addr = self.config.bind_addr;
        let listener = runtime
            .block_on(TcpListener::bind(bind_addr))
            .map_err(|e| ProviderError::listener(format!("cannot bind {bind_addr}: {e}")))?;
        let addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let accept_task = runtime.spawn(accept_loop(
            listener,
            shutdown_rx,
            self.properties.clone(),
        ));

        info!(%addr, "TCP listener started");
        self.running = Some(Running {
            addr,
            runtime,
            shutdown,
            accept_task,
        });
        Ok(())
    }

    fn stop(&mut self) -> ProviderResult<()> {
        let running = self
            .running
            .take()
            .ok_or_else(|| ProviderError::listener("not running"))?;

        // The receiver is gone only if the accept task already ended.
        let _ = running.shutdown.send(());
        let joined = running.runtime.block_on(running.accept_task);
        drop(running.runtime);
        joined.map_err(|e| ProviderError::listener(format!("accept task failed: {e}")))?;

        info!(addr = %running.addr, "TCP listener stopped");
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }
}

impl Drop for SqliteListener {
    fn drop(&mut self) {
        if self.running.is_some() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "failed to stop listener on drop");
            }
        }
    }
}

/// Accepts clients until shutdown, then aborts and awaits every client task.
async fn accept_loop(
    listener: TcpListener,
    mut shutdown: oneshot::Receiver<()>,
    properties: Properties,
) {
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = RequestHandler::new(properties.clone());
                    clients.spawn(async move {
                        if let Err(e) = serve_client(stream, handler).await {
                            debug!(%peer, error = %e, "client connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(finished) = clients.join_next(), if !clients.is_empty() => {
                if let Err(e) = finished {
                    warn!(error = %e, "client task failed");
                }
            }
        }
    }

    drop(listener);
    clients.shutdown().await;
}

async fn serve_client(stream: TcpStream, mut handler: RequestHandler) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match decode_line::<Request>(&line) {
            Ok(request) => handler.handle(request),
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        };
        let encoded = encode_line(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
