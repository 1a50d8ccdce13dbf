// error.rs
// Error taxonomy for ledger operations.

use thiserror::Error;

use crate::store::StoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The targeted document does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Rejected before any write happened.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The substrate failed; the operation persisted nothing.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// Optimistic version check kept failing after the configured retries.
    #[error("concurrent update on {entity} {id}; retries exhausted")]
    Conflict { entity: &'static str, id: String },
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput(message.into())
    }
}
