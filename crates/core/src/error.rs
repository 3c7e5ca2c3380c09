//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock sufficiency, conflicts). Storage failures belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (missing justification, non-positive quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced product, location, formulation or aggregate does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A deduction would exceed the available balance.
    #[error(
        "insufficient stock for product {product} at {location}: requested {requested_kg} kg, available {available_kg} kg"
    )]
    InsufficientStock {
        product: String,
        location: String,
        requested_kg: Decimal,
        available_kg: Decimal,
    },

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(
        product: impl core::fmt::Display,
        location: impl core::fmt::Display,
        requested_kg: Decimal,
        available_kg: Decimal,
    ) -> Self {
        Self::InsufficientStock {
            product: product.to_string(),
            location: location.to_string(),
            requested_kg,
            available_kg,
        }
    }
}
