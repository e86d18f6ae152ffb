use std::time::Duration;

use thiserror::Error;

use crate::split::SplitError;

/// Failures raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    /// A conditional write found the record in a different state than expected.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything the ledger surfaces to its callers.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// `outstanding` is what the debtor actually owes the creditor; a negative
    /// value means the debt runs the other way.
    #[error("amount mismatch error: claimed {claimed}, amount due: {outstanding}")]
    AmountMismatch { claimed: f64, outstanding: f64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("ledger task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<SplitError> for LedgerError {
    fn from(err: SplitError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}
