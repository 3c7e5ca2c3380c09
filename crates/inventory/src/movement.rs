//! Append-only movement history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use resinstock_core::{
    Actor, AdjustmentId, InventoryCountId, LocationCode, MovementId, ProductId, ProductionOrderId,
    TransferId,
};
use resinstock_events::Event;

use crate::balance::{BalanceKey, StockLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Entry,
    TransferOut,
    TransferIn,
    ProductionOut,
    ProductionIn,
    FactoryOut,
    FactoryIn,
    Adjustment,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Entry => "entry",
            MovementType::TransferOut => "transfer_out",
            MovementType::TransferIn => "transfer_in",
            MovementType::ProductionOut => "production_out",
            MovementType::ProductionIn => "production_in",
            MovementType::FactoryOut => "factory_out",
            MovementType::FactoryIn => "factory_in",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a movement added stock to or removed stock from its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// What kind of business document caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Receipt,
    Transfer,
    ProductionOrder,
    FactoryIssue,
    InventoryCount,
    AdminAdjustment,
}

impl ReferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceKind::Receipt => "receipt",
            ReferenceKind::Transfer => "transfer",
            ReferenceKind::ProductionOrder => "production_order",
            ReferenceKind::FactoryIssue => "factory_issue",
            ReferenceKind::InventoryCount => "inventory_count",
            ReferenceKind::AdminAdjustment => "admin_adjustment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementReference {
    pub kind: ReferenceKind,
    pub id: Uuid,
}

impl MovementReference {
    pub fn receipt(id: Uuid) -> Self {
        Self { kind: ReferenceKind::Receipt, id }
    }

    pub fn transfer(id: TransferId) -> Self {
        Self { kind: ReferenceKind::Transfer, id: id.into() }
    }

    pub fn production_order(id: ProductionOrderId) -> Self {
        Self { kind: ReferenceKind::ProductionOrder, id: id.into() }
    }

    pub fn factory_issue(id: Uuid) -> Self {
        Self { kind: ReferenceKind::FactoryIssue, id }
    }

    pub fn inventory_count(id: InventoryCountId) -> Self {
        Self { kind: ReferenceKind::InventoryCount, id: id.into() }
    }

    pub fn admin_adjustment(id: AdjustmentId) -> Self {
        Self { kind: ReferenceKind::AdminAdjustment, id: id.into() }
    }
}

/// Ideal versus actually issued kilograms of a production ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionUsage {
    pub ideal_kg: Decimal,
    pub sent_kg: Decimal,
}

impl ProductionUsage {
    /// Kilograms issued beyond the formulation's demand (negative when under-issued).
    pub fn loss_kg(&self) -> Decimal {
        self.sent_kg - self.ideal_kg
    }
}

/// One immutable balance change.
///
/// `quantity` and `total_kg` are magnitudes; `direction` carries the sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub location: LocationCode,
    pub movement_type: MovementType,
    pub direction: Direction,
    pub quantity: Decimal,
    pub unit: crate::conversion::StockUnit,
    pub total_kg: Decimal,
    pub reference: MovementReference,
    pub actor: Actor,
    pub notes: Option<String>,
    pub production: Option<ProductionUsage>,
    pub occurred_at: DateTime<Utc>,
}

impl Movement {
    pub fn new(
        movement_type: MovementType,
        direction: Direction,
        key: &BalanceKey,
        amount: &StockLevel,
        reference: MovementReference,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            product_id: key.product_id,
            location: key.location.clone(),
            movement_type,
            direction,
            quantity: amount.quantity.abs(),
            unit: amount.unit,
            total_kg: amount.total_kg.abs(),
            reference,
            actor: actor.clone(),
            notes: None,
            production: None,
            occurred_at,
        }
    }

    pub fn inbound(
        movement_type: MovementType,
        key: &BalanceKey,
        amount: &StockLevel,
        reference: MovementReference,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(movement_type, Direction::Inbound, key, amount, reference, actor, occurred_at)
    }

    pub fn outbound(
        movement_type: MovementType,
        key: &BalanceKey,
        amount: &StockLevel,
        reference: MovementReference,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(movement_type, Direction::Outbound, key, amount, reference, actor, occurred_at)
    }

    /// Adjustment movement for a signed `difference` (new − old).
    pub fn adjustment(
        key: &BalanceKey,
        difference: &StockLevel,
        reference: MovementReference,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let direction = if difference.total_kg.is_sign_negative() && !difference.total_kg.is_zero() {
            Direction::Outbound
        } else {
            Direction::Inbound
        };
        Self::new(
            MovementType::Adjustment,
            direction,
            key,
            difference,
            reference,
            actor,
            occurred_at,
        )
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_production_usage(mut self, usage: ProductionUsage) -> Self {
        self.production = Some(usage);
        self
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.product_id, self.location.clone())
    }

    /// Kilograms with the sign of the movement's effect on its location.
    pub fn signed_kg(&self) -> Decimal {
        match self.direction {
            Direction::Inbound => self.total_kg,
            Direction::Outbound => -self.total_kg,
        }
    }
}

impl Event for Movement {
    fn event_type(&self) -> &'static str {
        match self.movement_type {
            MovementType::Entry => "stock.movement.entry",
            MovementType::TransferOut => "stock.movement.transfer_out",
            MovementType::TransferIn => "stock.movement.transfer_in",
            MovementType::ProductionOut => "stock.movement.production_out",
            MovementType::ProductionIn => "stock.movement.production_in",
            MovementType::FactoryOut => "stock.movement.factory_out",
            MovementType::FactoryIn => "stock.movement.factory_in",
            MovementType::Adjustment => "stock.movement.adjustment",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn stream_key(&self) -> String {
        self.key().to_string()
    }
}

/// A movement as stored in the log, with its global position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMovement {
    pub sequence_number: u64,
    pub movement: Movement,
}

#[cfg(test)]
mod tests {
    use resinstock_core::UserId;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::catalog::Product;
    use crate::conversion::StockUnit;

    fn actor() -> Actor {
        Actor::new(UserId::new(), "Operator")
    }

    #[test]
    fn negative_adjustment_is_outbound_with_positive_magnitude() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "PCP");
        let diff = StockLevel::from_kg(dec!(-50), StockUnit::Kg, &p);

        let m = Movement::adjustment(
            &key,
            &diff,
            MovementReference::admin_adjustment(AdjustmentId::new()),
            &actor(),
            Utc::now(),
        );

        assert_eq!(m.direction, Direction::Outbound);
        assert_eq!(m.total_kg, dec!(50));
        assert_eq!(m.signed_kg(), dec!(-50));
        assert_eq!(m.event_type(), "stock.movement.adjustment");
    }

    #[test]
    fn production_usage_reports_loss() {
        let usage = ProductionUsage {
            ideal_kg: dec!(237),
            sent_kg: dec!(250),
        };
        assert_eq!(usage.loss_kg(), dec!(13));
    }

    #[test]
    fn stream_key_is_the_balance_key() {
        let p = Product::bulk(ProductId::new(), "CaCO3");
        let key = BalanceKey::new(p.id, "CD");
        let m = Movement::inbound(
            MovementType::Entry,
            &key,
            &StockLevel::from_kg(dec!(5), StockUnit::Kg, &p),
            MovementReference::receipt(uuid::Uuid::now_v7()),
            &actor(),
            Utc::now(),
        );
        assert_eq!(m.stream_key(), key.to_string());
    }
}
