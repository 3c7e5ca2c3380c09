use rust_decimal::Decimal;
use thiserror::Error;

use resinstock_core::DomainError;

use crate::store::StoreError;

/// Error surface of every ledger workflow.
///
/// All validation precedes the commit, so any of these leaves the ledger untouched.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(
        "insufficient stock of {product} at {location}: requested {requested_kg} kg, available {available_kg} kg"
    )]
    InsufficientStock {
        product: String,
        location: String,
        requested_kg: Decimal,
        available_kg: Decimal,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent writer won; retrying the whole operation may succeed.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("persistence failure: {0}")]
    Persistence(#[source] StoreError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        LedgerError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Concurrency(_))
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            DomainError::NotFound(what) => LedgerError::NotFound(what),
            DomainError::Conflict(msg) => LedgerError::Concurrency(msg),
            DomainError::InsufficientStock {
                product,
                location,
                requested_kg,
                available_kg,
            } => LedgerError::InsufficientStock {
                product,
                location,
                requested_kg,
                available_kg,
            },
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LedgerError::Concurrency(msg),
            other => LedgerError::Persistence(other),
        }
    }
}
