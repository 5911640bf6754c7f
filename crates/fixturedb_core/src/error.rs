//! Error types for the fixture manager.

use fixturedb_provider::{HandleId, ProviderError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by test bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for fixture operations.
pub type FixtureResult<T> = Result<T, FixtureError>;

/// Errors raised by the fixture manager.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The persistence provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The global override file could not be read.
    #[error("cannot read global properties {}: {source}", path.display())]
    GlobalProperties {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A test body returned with a transaction still open.
    #[error("transaction left open on {handle} ({count} handle(s) leaked a transaction)")]
    LeakedTransaction {
        /// First offending handle.
        handle: HandleId,
        /// Number of handles with an open transaction.
        count: usize,
    },

    /// Clearing made no progress under the strict policy.
    #[error(
        "clearing unit '{unit}' stalled with {} table(s) left: {first_failure}",
        .pending.len()
    )]
    ClearingStalled {
        /// Persistence unit.
        unit: String,
        /// Tables that could not be emptied.
        pending: Vec<String>,
        /// First failure of the stalled pass.
        first_failure: String,
    },

    /// A session was used after being closed.
    #[error("session {0} is closed")]
    SessionClosed(HandleId),

    /// The test body failed.
    #[error("test body failed: {0}")]
    Body(#[source] BoxError),
}

impl FixtureError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wraps a body error, unwrapping fixture and provider errors raised
    /// inside the body.
    pub fn from_body(err: BoxError) -> Self {
        let err = match err.downcast::<FixtureError>() {
            Ok(err) => return *err,
            Err(err) => err,
        };
        match err.downcast::<ProviderError>() {
            Ok(err) => Self::Provider(*err),
            Err(err) => Self::Body(err),
        }
    }

    /// Returns true for a leaked transaction.
    pub fn is_leaked_transaction(&self) -> bool {
        matches!(self, Self::LeakedTransaction { .. })
    }
}
