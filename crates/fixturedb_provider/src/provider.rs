//! Provider trait definitions.

use crate::error::{ProviderError, ProviderResult};
use crate::metamodel::EntityType;
use crate::properties::Properties;
use std::fmt;
use std::net::SocketAddr;

/// Identity of a handle, unique per process run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(uuid::Uuid);

impl HandleId {
    /// Generates a new random handle id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let simple = self.0.simple().to_string();
        write!(f, "handle-{}", &simple[..8])
    }
}

/// Result of a delete-all that did not fail fatally.
#[derive(Debug)]
pub enum DeleteOutcome {
    /// Rows were deleted.
    Deleted(u64),
    /// The store refused because of an integrity constraint; retry later.
    Conflict(ProviderError),
}

/// Entry point of a persistence provider.
///
/// A provider turns a persistence unit identifier plus configuration into a
/// [`PersistenceFactory`]. Factory construction is expected to be expensive
/// and is memoised by the caller.
pub trait PersistenceProvider: Send + Sync {
    /// Factory type produced by this provider.
    type Factory: PersistenceFactory;

    /// Builds the factory for `unit`.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the unit is unknown or the
    /// configuration is invalid.
    fn create_factory(&self, unit: &str, properties: &Properties) -> ProviderResult<Self::Factory>;

    /// Creates a network listener exposing the provider's databases on `port`.
    ///
    /// The listener is returned stopped.
    ///
    /// # Errors
    ///
    /// The default implementation reports the capability as unsupported.
    fn create_listener(
        &self,
        port: u16,
        properties: &Properties,
    ) -> ProviderResult<Box<dyn DatabaseListener>> {
        let _ = (port, properties);
        Err(ProviderError::Unsupported("network listener".into()))
    }
}

/// An expensive, provider-specific object bound to one persistence unit.
pub trait PersistenceFactory: Send + Sync + 'static {
    /// Handle type produced by this factory.
    type Handle: PersistenceHandle;

    /// The persistence unit this factory serves.
    fn unit_name(&self) -> &str;

    /// Creates a new handle.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the handle configuration is rejected
    /// or the store cannot be reached.
    fn create_handle(&self, properties: &Properties) -> ProviderResult<Self::Handle>;

    /// Types managed by this factory.
    fn managed_types(&self) -> &[EntityType];

    /// Discards all stored data, as a last resort when clearing cannot make
    /// progress.
    ///
    /// # Errors
    ///
    /// The default implementation reports the capability as unsupported.
    fn reset_storage(&self) -> ProviderResult<()> {
        Err(ProviderError::Unsupported("storage reset".into()))
    }
}

/// A lightweight session against a factory's store.
///
/// A handle may hold at most one open transaction.
pub trait PersistenceHandle: Send + 'static {
    /// Identity used in logs and failure messages.
    fn id(&self) -> HandleId;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Fails if a transaction is already active or the store rejects it.
    fn begin(&mut self) -> ProviderResult<()>;

    /// Commits the active transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Constraint`] if deferred constraints fail.
    fn commit(&mut self) -> ProviderResult<()>;

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Fails if no transaction is active or the store rejects it.
    fn rollback(&mut self) -> ProviderResult<()>;

    /// Returns true while a transaction is open.
    fn is_transaction_active(&self) -> bool;

    /// Deletes every row of `storage_name` inside the active transaction.
    ///
    /// # Errors
    ///
    /// Integrity failures are reported as [`DeleteOutcome::Conflict`]; every
    /// other failure is an `Err` and must not be retried.
    fn delete_all(&mut self, storage_name: &str) -> ProviderResult<DeleteOutcome>;

    /// Releases the handle's resources. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails to release the session.
    fn close(&mut self) -> ProviderResult<()>;
}

/// A network endpoint exposing the embedded database to other processes.
pub trait DatabaseListener: Send {
    /// Binds and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Fails if the port cannot be bound or the listener already runs.
    fn start(&mut self) -> ProviderResult<()>;

    /// Stops accepting connections and releases the port.
    ///
    /// # Errors
    ///
    /// Fails if the listener is not running or cannot be shut down.
    fn stop(&mut self) -> ProviderResult<()>;

    /// The bound address while running.
    fn local_addr(&self) -> Option<SocketAddr>;
}
