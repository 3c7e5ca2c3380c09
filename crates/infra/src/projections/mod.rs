//! Read-side models fed by committed movements or ledger snapshots.
//!
//! Read models are advisory: nothing on the write side consults them.

pub mod location_summary;
pub mod production_loss;

pub use location_summary::{LocationStockSummary, summarize};
pub use production_loss::{ProductionLoss, ProductionLossProjection, RebuildError};
