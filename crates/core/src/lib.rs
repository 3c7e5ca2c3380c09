//! `resinstock-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod actor;
pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use actor::Actor;
pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{
    AdjustmentId, FormulationId, InventoryCountId, LocationCode, MovementId, ProductId,
    ProductionOrderId, TransferId, UserId,
};
pub use value_object::ValueObject;
