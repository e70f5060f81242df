//! Reconciler error types.

use thiserror::Error;

use crate::relation::{Operation, Relation};

/// Errors reported by a [`RelationStore`](crate::store::RelationStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The relation is not present remotely.
    #[error("not found: ({left}, {right})")]
    NotFound { left: String, right: String },

    /// The relation is already present remotely.
    #[error("already bound: ({left}, {right})")]
    AlreadyBound { left: String, right: String },

    /// Transport, auth or server failure.
    #[error("remote: {0}")]
    Remote(String),
}

/// Errors that can occur during a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Malformed or missing identifier pair.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A bind/unbind (or entitle/revoke) call failed and aborted the pass.
    #[error("{op} {relation} failed: {source}")]
    Store {
        op: Operation,
        relation: Relation,
        #[source]
        source: StoreError,
    },

    /// Listing remote associations failed.
    #[error("reading remote state failed: {0}")]
    Observe(#[source] StoreError),

    /// The caller cancelled the pass before `op` on `relation` completed.
    #[error("cancelled before {op} {relation} completed")]
    Cancelled { op: Operation, relation: Relation },
}

impl StoreError {
    pub fn not_found(left: &str, right: &str) -> Self {
        StoreError::NotFound {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn already_bound(left: &str, right: &str) -> Self {
        StoreError::AlreadyBound {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl ReconcileError {
    /// The underlying store error, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            ReconcileError::Store { source, .. } | ReconcileError::Observe(source) => Some(source),
            _ => None,
        }
    }

    /// The relation the failed operation targeted, if any.
    pub fn relation(&self) -> Option<&Relation> {
        match self {
            ReconcileError::Store { relation, .. } | ReconcileError::Cancelled { relation, .. } => {
                Some(relation)
            }
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled { .. })
    }
}

/// Result type for reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
