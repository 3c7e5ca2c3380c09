//! Stock adjustment audit records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use resinstock_core::{
    Actor, AdjustmentId, DomainError, DomainResult, InventoryCountId, LocationCode, ProductId,
};

use crate::balance::{BalanceKey, StockLevel};
use crate::conversion::StockUnit;
use crate::movement::MovementReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "count_id")]
pub enum AdjustmentReference {
    InventoryCount(InventoryCountId),
    AdminAdjustment,
}

/// Immutable record of a balance overwrite with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub id: AdjustmentId,
    pub product_id: ProductId,
    pub location: LocationCode,
    /// Unit of both quantities; overwrites keep the balance's unit.
    pub unit: StockUnit,
    pub old_quantity: Decimal,
    pub old_total_kg: Decimal,
    pub new_quantity: Decimal,
    pub new_total_kg: Decimal,
    pub difference_kg: Decimal,
    pub reason: String,
    pub reference: AdjustmentReference,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

impl StockAdjustment {
    pub fn record(
        key: &BalanceKey,
        old: &StockLevel,
        new: &StockLevel,
        reason: impl Into<String>,
        reference: AdjustmentReference,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AdjustmentId::new(),
            product_id: key.product_id,
            location: key.location.clone(),
            unit: new.unit,
            old_quantity: old.quantity,
            old_total_kg: old.total_kg,
            new_quantity: new.quantity,
            new_total_kg: new.total_kg,
            difference_kg: new.total_kg - old.total_kg,
            reason: reason.into(),
            reference,
            actor: actor.clone(),
            occurred_at,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.product_id, self.location.clone())
    }

    /// Signed difference expressed as a level, for the paired movement.
    pub fn difference(&self) -> StockLevel {
        StockLevel {
            quantity: self.new_quantity - self.old_quantity,
            unit: self.unit,
            total_kg: self.difference_kg,
        }
    }

    /// Reference carried by the paired `adjustment` movement.
    pub fn movement_reference(&self) -> MovementReference {
        match self.reference {
            AdjustmentReference::InventoryCount(count_id) => {
                MovementReference::inventory_count(count_id)
            }
            AdjustmentReference::AdminAdjustment => MovementReference::admin_adjustment(self.id),
        }
    }
}

/// Trimmed justification, rejecting blank text.
pub fn require_justification(text: &str) -> DomainResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("a justification is required"));
    }
    Ok(trimmed.to_string())
}
