//! Inventory ledger domain for the plastics factory.
//!
//! This crate contains the business rules of the stock ledger: unit conversion,
//! balances, movements, transfers, production planning, physical counts and
//! adjustments. It is deterministic domain logic (no IO, no storage); the
//! workflows that load, validate and commit these types live in `resinstock-infra`.

pub mod adjustment;
pub mod balance;
pub mod catalog;
pub mod conversion;
pub mod count;
pub mod movement;
pub mod production;
pub mod transfer;

pub use adjustment::{AdjustmentReference, StockAdjustment, require_justification};
pub use balance::{BalanceKey, StockBalance, StockLevel};
pub use catalog::{Formulation, FormulationItem, Location, PackageType, Product, ProductLookup};
pub use conversion::{StockUnit, from_kg, to_kg};
pub use count::{DIFFERENCE_TOLERANCE_KG, InventoryCount, InventoryCountItem, InventoryCountStatus};
pub use movement::{
    Direction, LoggedMovement, Movement, MovementReference, MovementType, ProductionUsage,
    ReferenceKind,
};
pub use production::{
    IngredientOverride, IngredientRequirement, ProductionOrder, ProductionOrderItem,
    ProductionOrderStatus, ProductionPlan, package_requirement, plan_production,
};
pub use transfer::{
    Delivery, EXACT_DELIVERY_TOLERANCE, Transfer, TransferItem, TransferItemStatus,
    TransferLine, TransferOrigin, TransferStatus, classify_delivery,
};
