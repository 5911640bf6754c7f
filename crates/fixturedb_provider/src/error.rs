//! Error types for provider operations.

use std::io;
use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by a persistence provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A factory or handle could not be built from its configuration.
    #[error("construction failed for unit '{unit}': {message}")]
    Construction {
        /// The persistence unit being constructed.
        unit: String,
        /// Description of the failure.
        message: String,
    },

    /// No persistence unit with this identifier is declared.
    #[error("unknown persistence unit: {0}")]
    UnknownUnit(String),

    /// The store rejected a statement because of an integrity constraint.
    #[error("constraint violation on '{target}': {message}")]
    Constraint {
        /// Table or statement that failed.
        target: String,
        /// Store-reported detail.
        message: String,
    },

    /// Any other error reported by the underlying store.
    #[error("store error: {0}")]
    Store(String),

    /// Entity values could not be mapped to or from rows.
    #[error("mapping error for '{entity}': {message}")]
    Mapping {
        /// The entity storage name.
        entity: String,
        /// Description of the mapping problem.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The handle was already closed.
    #[error("handle {0} is closed")]
    HandleClosed(String),

    /// Transaction operation invalid in the current state.
    #[error("invalid transaction state: {0}")]
    TransactionState(String),

    /// The network listener failed to start or stop.
    #[error("listener error: {0}")]
    Listener(String),

    /// Malformed listener request or response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The provider does not support the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Creates a construction error.
    pub fn construction(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Creates a constraint violation error.
    pub fn constraint(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Creates a generic store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Creates a listener error.
    pub fn listener(message: impl Into<String>) -> Self {
        Self::Listener(message.into())
    }

    /// Creates a transaction state error.
    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::TransactionState(message.into())
    }

    /// Returns true if the store reported an integrity constraint failure.
    ///
    /// Clearing treats these as "try again in the next pass".
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_classification() {
        assert!(ProviderError::constraint("Book", "FOREIGN KEY constraint failed").is_constraint());
        assert!(!ProviderError::store("disk I/O error").is_constraint());
        assert!(!ProviderError::construction("unit", "bad url").is_constraint());
    }

    #[test]
    fn messages_name_the_unit() {
        let err = ProviderError::construction("unit-x", "driver unavailable");
        assert_eq!(
            err.to_string(),
            "construction failed for unit 'unit-x': driver unavailable"
        );
    }
}
