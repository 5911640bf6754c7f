//! Tracked persistence sessions.

use crate::error::{FixtureError, FixtureResult};
use fixturedb_provider::{HandleId, PersistenceHandle, ProviderResult};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

struct Inner<H> {
    id: HandleId,
    unit: String,
    handle: Mutex<Option<H>>,
}

/// A handle handed to a test body.
///
/// Sessions are cheap to clone; every clone refers to the same handle. The
/// fixture keeps its own clone so it can validate and close the handle after
/// the body returns. Closing takes the handle out, after which the fixture
/// ignores the session.
pub struct Session<H> {
    inner: Arc<Inner<H>>,
}

impl<H> Clone for Session<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H> fmt::Debug for Session<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("unit", &self.inner.unit)
            .field("open", &self.inner.handle.lock().is_some())
            .finish()
    }
}

impl<H: PersistenceHandle> Session<H> {
    pub(crate) fn new(unit: &str, handle: H) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: handle.id(),
                unit: unit.to_string(),
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Identity of the underlying handle.
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    /// Persistence unit of the handle.
    pub fn unit(&self) -> &str {
        &self.inner.unit
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.inner.handle.lock().is_some()
    }

    /// Locks the handle for direct use.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::SessionClosed`] after close.
    pub fn lock(&self) -> FixtureResult<MappedMutexGuard<'_, H>> {
        MutexGuard::try_map(self.inner.handle.lock(), Option::as_mut)
            .map_err(|_| FixtureError::SessionClosed(self.inner.id))
    }

    /// Runs `f` against the locked handle.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or `f` fails.
    pub fn with<R>(&self, f: impl FnOnce(&mut H) -> ProviderResult<R>) -> FixtureResult<R> {
        let mut handle = self.lock()?;
        Ok(f(&mut *handle)?)
    }

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or a transaction is already active.
    pub fn begin(&self) -> FixtureResult<()> {
        self.with(H::begin)
    }

    /// Commits the active transaction.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or the commit is rejected.
    pub fn commit(&self) -> FixtureResult<()> {
        self.with(H::commit)
    }

    /// Rolls back the active transaction.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or no transaction is active.
    pub fn rollback(&self) -> FixtureResult<()> {
        self.with(H::rollback)
    }

    /// Returns true while the handle holds an open transaction. A closed
    /// session never does.
    pub fn is_transaction_active(&self) -> bool {
        self.inner
            .handle
            .lock()
            .as_ref()
            .is_some_and(H::is_transaction_active)
    }

    /// Closes the handle. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the provider's close failure; the session counts as closed
    /// either way.
    pub fn close(&self) -> FixtureResult<()> {
        let taken = self.inner.handle.lock().take();
        match taken {
            Some(mut handle) => {
                trace!(id = %self.inner.id, unit = %self.inner.unit, "closing session");
                Ok(handle.close()?)
            }
            None => Ok(()),
        }
    }
}
